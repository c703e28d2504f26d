//! TCP command link with manifest validation — one server, one client.
//!
//! Run with:
//!   cargo run --example tcp-command

use std::sync::Arc;

use rovecomm::{CallbackRegistry, Manifest, Packet, TcpEngine, TcpHost};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manifest = Arc::new(Manifest::from_json_str(
        r#"[{"name": "DriveLeftRight", "data_id": 3000, "element_type": "int16", "element_count": 2}]"#,
    )?);
    let drive_id = manifest.id_of("DriveLeftRight").unwrap();

    let registry = Arc::new(CallbackRegistry::new());
    registry.add::<i16, _>(drive_id, |packet| {
        eprintln!(
            "drive command: left {} right {}",
            packet.elements[0], packet.elements[1]
        );
    });

    let host = TcpHost::bind("127.0.0.1:0".parse()?)?;
    let addr = host.local_addr()?;

    let server = std::thread::spawn(move || -> Result<(), rovecomm::TransportError> {
        let engine = Arc::new(host.accept(registry)?.with_manifest(manifest));
        let receive_loop = engine.run_continuous()?;
        receive_loop.join();
        Ok(())
    });

    let client = TcpEngine::connect(addr, Arc::new(CallbackRegistry::new()))?;
    for speed in [100i16, 250, 0] {
        client.send(&Packet::<i16>::new(drive_id, vec![speed, speed]), addr)?;
    }
    drop(client);

    server.join().expect("server thread panicked")?;
    Ok(())
}
