//! Minimal UDP telemetry pair — a subscriber and a publisher on loopback.
//!
//! Run with:
//!   cargo run --example udp-telemetry

use std::sync::Arc;
use std::time::Duration;

use rovecomm::{CallbackRegistry, Packet, UdpEngine};

const GPS_LAT_LON: u16 = 6100;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(CallbackRegistry::new());
    registry.add::<f64, _>(GPS_LAT_LON, |packet| {
        eprintln!(
            "gps fix from {:?}: lat {:.4} lon {:.4}",
            packet.source, packet.elements[0], packet.elements[1]
        );
    });

    let receiver = Arc::new(UdpEngine::bind("127.0.0.1:0".parse()?, registry)?);
    let addr = receiver.local_addr()?;
    let receive_loop = receiver.run_continuous()?;
    eprintln!("Subscribed to data id {GPS_LAT_LON} on {addr}");

    let publisher = UdpEngine::sender(Arc::new(CallbackRegistry::new()))?;
    for step in 0..5 {
        let lat = 37.9485 + f64::from(step) * 0.0001;
        publisher.send(&Packet::<f64>::new(GPS_LAT_LON, vec![lat, -91.7715]), addr)?;
        std::thread::sleep(Duration::from_millis(200));
    }

    receiver.close();
    receive_loop.join();
    Ok(())
}
