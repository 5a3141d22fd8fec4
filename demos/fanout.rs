//! Fan out a write to two hosts, then read it back with failover.
//!
//! Start two local Redis servers on 6379 and 6380 before running this.

use std::thread;
use std::time::Duration;

use redis_mesh::{MeshConfig, Instance};

fn main() -> redis_mesh::Result<()> {
    tracing_subscriber::fmt::init();

    let mut instance = Instance::new(MeshConfig::new().reader_max(4))?;
    instance.host_add("127.0.0.1", 6379)?;
    instance.host_add("127.0.0.1", 6380)?;
    instance.run_thr()?;

    let mut set = redis::cmd("SET");
    set.arg("redis_mesh_demo").arg("hello from the fan-out writer");
    instance.write(set)?;

    // Writes are fanned out asynchronously; give the engine a moment to
    // actually settle the outbound connections before reading it back.
    thread::sleep(Duration::from_millis(200));

    let get = redis::cmd("GET").arg("redis_mesh_demo").get_packed_command();
    let mut reader = instance.reader_get();
    let replies = reader.exec(&[get])?;
    instance.reader_release(reader);

    println!("{:?}", replies);

    instance.shutdown();
    Ok(())
}
