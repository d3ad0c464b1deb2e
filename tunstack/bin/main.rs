//! An echo server on a tun interface.
//!
//! Accepts connections on every listed port and sends back all data it receives. A connection is
//! closed from our side once the remote has closed its side and all data was echoed.
//!
//! Call example, after which `nc 10.0.0.1 7` on the host talks to the endpoint:
//!
//! * `tunstack tun0 10.0.0.1 -l 7`
//! * `ip addr add 10.0.0.2/24 dev tun0 && ip link set tun0 up`
use std::collections::HashSet;
use std::error::Error;
use std::sync::Arc;

use tunstack::config::Config;
use tunstack::engine::{Engine, Shutdown};
use tunstack::layer::{self, tcp};
use tunstack::nic::sys::TunInterface;
use tunstack::time::Instant;
use tunstack::wire::Ipv4Address;

const CHUNK: usize = 4096;

fn main() {
    env_logger::init();
    let config = Config::from_args();

    if let Err(err) = run(&config) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

fn run(config: &Config) -> Result<(), Box<dyn Error>> {
    let interface = TunInterface::new(&config.tun)?;
    let endpoint = Arc::new(tcp::Endpoint::new(config.tcp()));

    for &port in &config.listen {
        let tuple = tcp::FourTuple {
            local: config.local(),
            remote: Ipv4Address::UNSPECIFIED,
            local_port: port,
            remote_port: 0,
        };
        endpoint.open(tcp::Open::Passive, tuple, Instant::now())?;
    }

    let shutdown = Shutdown::new();
    let token = shutdown.clone();
    ctrlc::set_handler(move || token.trigger())?;

    let mut engine = Engine::new(interface, Arc::clone(&endpoint))
        .with_checksum(config.checksum())
        .with_poll_interval(config.poll_interval());

    log::info!("[+] Configured endpoint, serving on {:?}", config.listen);

    let mut echo = Echo::default();
    while !shutdown.is_triggered() {
        let now = Instant::now();
        engine.poll(now)?;
        echo.notifications(&endpoint);
        echo.serve(&endpoint, now);
    }

    log::info!("[+] Done");
    for key in echo.connections.drain() {
        let _ = endpoint.abort(key);
    }
    engine.run(&shutdown)?;
    Ok(())
}

#[derive(Default)]
struct Echo {
    connections: HashSet<tcp::SlotKey>,
}

impl Echo {
    fn notifications(&mut self, endpoint: &tcp::Endpoint) {
        while let Some(event) = endpoint.poll_notification() {
            match event.notification {
                tcp::Notification::Established => {
                    log::info!("{}: connected", event.tuple);
                    self.connections.insert(event.key);
                },
                other => {
                    match other.as_error() {
                        Some(err) => log::warn!("{}: {}", event.tuple, err),
                        None => log::info!("{}: {:?}", event.tuple, other),
                    }
                    self.connections.remove(&event.key);
                },
            }
        }
    }

    fn serve(&mut self, endpoint: &tcp::Endpoint, now: Instant) {
        let mut finished = Vec::new();
        for &key in &self.connections {
            match endpoint.receive(key, CHUNK) {
                Ok(data) if data.is_empty() => {},
                Ok(data) => {
                    if let Err(err) = endpoint.send(key, &data, now) {
                        log::warn!("echo on {} failed: {}", key, err);
                    }
                },
                Err(layer::Error::ConnectionClosing) => {
                    let _ = endpoint.close(key, now);
                    finished.push(key);
                },
                Err(err) => {
                    log::debug!("{}: {}", key, err);
                    finished.push(key);
                },
            }
        }

        for key in finished {
            self.connections.remove(&key);
        }
    }
}
