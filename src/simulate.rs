// Simulated ADF unit - synthetic bearing lines with GPS passthrough, for running without hardware

use crate::sentence::with_checksum;
use crate::serial::LineReader;
use chrono::{DateTime, Utc};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

// Tiger Mountain, WA State
const SIM_LATITUDE: &str = "4726.5500";
const SIM_LONGITUDE: &str = "12158.6560";

/// Emits a GPS sentence after this many bearings
const GPS_EVERY: u64 = 5;
/// Emits a line neither decoder accepts after this many bearings
const NOISE_EVERY: u64 = 37;

/// Endless line source sweeping the compass
#[derive(Debug, Clone)]
pub struct Simulator {
    bearing: u16,
    step: u16,
    count: u64,
    pending: Vec<String>,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(0, 7)
    }
}

impl Simulator {
    pub fn new(start_bearing: u16, step: u16) -> Self {
        Self {
            bearing: start_bearing % 360,
            step: step % 360,
            count: 0,
            pending: Vec::new(),
        }
    }

    /// Next line at wall clock `now`
    pub fn next_line_at(&mut self, now: DateTime<Utc>) -> String {
        if let Some(line) = self.pending.pop() {
            return line;
        }

        self.count += 1;
        let quality = 5 + (self.count % 5);
        let line = format!("%{:03}/{}", self.bearing, quality);
        self.bearing = (self.bearing + self.step) % 360;

        if self.count % NOISE_EVERY == 0 {
            self.pending.push("ADF SELFTEST OK".to_string());
        }
        if self.count % GPS_EVERY == 0 {
            self.pending.push(rmc_line(now));
        }
        line
    }
}

impl Iterator for Simulator {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        Some(self.next_line_at(Utc::now()))
    }
}

fn rmc_line(now: DateTime<Utc>) -> String {
    with_checksum(&format!(
        "GPRMC,{}.{:02},A,{},N,{},W,0.000,,{},,,A",
        now.format("%H%M%S"),
        now.timestamp_subsec_millis() / 10,
        SIM_LATITUDE,
        SIM_LONGITUDE,
        now.format("%d%m%y"),
    ))
}

/// Feed simulator lines into the reader's relay every `interval` until disconnected
pub fn run_simulation(reader: &LineReader, mut simulator: Simulator, interval: Duration) {
    reader.disconnect();
    let stop_flag = reader.stop_flag();
    stop_flag.store(false, Ordering::SeqCst);
    reader.set_simulating();
    log::info!("Starting ADF simulation, one line every {:?}", interval);

    let relay = std::sync::Arc::clone(reader.relay());
    let handle = thread::spawn(move || {
        while !stop_flag.load(Ordering::SeqCst) {
            let line = simulator.next_line_at(Utc::now());
            log::trace!("simulated line {}", line);
            relay.process_line(&line);
            thread::sleep(interval);
        }
    });
    reader.set_handle(handle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::dispatch::{Dispatched, Dispatcher};
    use crate::relay::Relay;
    use crate::serial::ConnectionStatus;
    use crate::sink::NullSink;
    use chrono::TimeZone;
    use std::sync::Arc;

    #[test]
    fn test_simulated_lines_decode() {
        let now = Utc.with_ymd_and_hms(2017, 2, 25, 18, 7, 47).unwrap();
        let mut sim = Simulator::default();
        let mut d = Dispatcher::default();
        let (mut bearings, mut fixes, mut unhandled) = (0, 0, 0);
        for _ in 0..200 {
            match d.dispatch_at(&sim.next_line_at(now), now) {
                Dispatched::Bearing(_) => bearings += 1,
                Dispatched::Gps { fix, .. } => {
                    assert!(fix.status_good);
                    assert_eq!(fix.utc_date, "250217");
                    assert_eq!(fix.utc_time, "180747.00");
                    fixes += 1;
                }
                Dispatched::Unhandled(_) => unhandled += 1,
                Dispatched::Empty => panic!("simulator emitted an empty line"),
            }
        }
        assert!(bearings > 150, "bearings {}", bearings);
        assert!(fixes > 20, "fixes {}", fixes);
        assert!(unhandled >= 1, "noise line expected");
    }

    #[test]
    fn test_bearing_sweep_wraps() {
        let mut sim = Simulator::new(350, 20);
        let first = sim.next();
        let second = sim.next();
        assert_eq!(first.as_deref().map(|l| &l[..4]), Some("%350"));
        assert_eq!(second.as_deref().map(|l| &l[..4]), Some("%010"));
    }

    #[test]
    fn test_run_simulation_feeds_relay() {
        let relay = Arc::new(Relay::new(&AppConfig::default(), NullSink));
        let reader = LineReader::new(Arc::clone(&relay));
        run_simulation(&reader, Simulator::default(), Duration::from_millis(1));
        assert_eq!(reader.status().status, ConnectionStatus::Simulating);
        while relay.counts().bearings < 10 {
            thread::sleep(Duration::from_millis(5));
        }
        reader.disconnect();
        assert!(relay.get_readings().is_ok());
    }
}
