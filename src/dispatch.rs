// Line dispatcher - decides per line which protocol owns it and keeps the latest readings
//
// ADF units commonly multiplex their bearing sentence with GPS passthrough on
// the same port, so a line that is not a bearing is offered to the GPS decoder
// before being reported as unhandled.

use crate::bearing::{self, BearingReading};
use crate::nmea::{GpsDecoder, GpsError, GpsFix};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What to do with a decoded fix whose status is not `A`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixPolicy {
    /// Every decoded fix replaces the stored one
    #[default]
    LatestWins,
    /// A not-good fix never replaces a stored good one
    KeepLastGood,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Bearing,
    Gps,
}

/// Latest-value cells. Written only by the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct Readings {
    bearing: Option<BearingReading>,
    fix: Option<GpsFix>,
}

impl Readings {
    pub fn bearing(&self) -> Option<&BearingReading> {
        self.bearing.as_ref()
    }

    pub fn fix(&self) -> Option<&GpsFix> {
        self.fix.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.bearing.is_none() && self.fix.is_none()
    }
}

/// Outcome of dispatching one line
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Bearing(BearingReading),
    /// `stored` is false when the fix policy kept the previous fix
    Gps { fix: GpsFix, stored: bool },
    Unhandled(GpsError),
    Empty,
}

/// Receives lines that neither decoder accepted
pub trait UnhandledHandler: Send {
    fn unhandled(&mut self, line: &str, error: &GpsError);
}

/// Default handler: diagnostic logging only
#[derive(Debug, Default)]
pub struct LogUnhandled;

impl UnhandledHandler for LogUnhandled {
    fn unhandled(&mut self, line: &str, error: &GpsError) {
        log::debug!("Unhandled message ({}): {:?}", error, line);
    }
}

impl<F> UnhandledHandler for F
where
    F: FnMut(&str, &GpsError) + Send,
{
    fn unhandled(&mut self, line: &str, error: &GpsError) {
        self(line, error)
    }
}

/// Per-protocol counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchCounts {
    pub lines: u64,
    pub bearings: u64,
    pub fixes: u64,
    pub unhandled: u64,
}

pub struct Dispatcher {
    gps: GpsDecoder,
    policy: FixPolicy,
    readings: Readings,
    last_protocol: Option<Protocol>,
    counts: DispatchCounts,
    unhandled: Box<dyn UnhandledHandler>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(GpsDecoder::default(), FixPolicy::default())
    }
}

impl Dispatcher {
    pub fn new(gps: GpsDecoder, policy: FixPolicy) -> Self {
        Self {
            gps,
            policy,
            readings: Readings::default(),
            last_protocol: None,
            counts: DispatchCounts::default(),
            unhandled: Box::new(LogUnhandled),
        }
    }

    pub fn with_unhandled_handler(mut self, handler: impl UnhandledHandler + 'static) -> Self {
        self.unhandled = Box::new(handler);
        self
    }

    pub fn readings(&self) -> &Readings {
        &self.readings
    }

    /// Protocol of the most recent successful decode
    pub fn last_protocol(&self) -> Option<Protocol> {
        self.last_protocol
    }

    pub fn counts(&self) -> DispatchCounts {
        self.counts
    }

    pub fn policy(&self) -> FixPolicy {
        self.policy
    }

    pub fn dispatch(&mut self, line: &str) -> Dispatched {
        self.dispatch_at(line, Utc::now())
    }

    /// Route one line: bearing first, then GPS, then the unhandled handler
    pub fn dispatch_at(&mut self, line: &str, now: DateTime<Utc>) -> Dispatched {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            log::trace!("zero length line arrived");
            return Dispatched::Empty;
        }
        self.counts.lines += 1;

        let bearing_err = match bearing::decode_at(line, now) {
            Ok(reading) => {
                log::trace!("bearing {} quality {}", reading.bearing, reading.quality);
                self.readings.bearing = Some(reading.clone());
                self.last_protocol = Some(Protocol::Bearing);
                self.counts.bearings += 1;
                return Dispatched::Bearing(reading);
            }
            Err(e) => e,
        };

        match self.gps.decode_line_at(line, now) {
            Ok(fix) => {
                log::trace!("GPS fix {} good={}", fix.utc_time, fix.status_good);
                let stored = self.store_fix(&fix);
                self.last_protocol = Some(Protocol::Gps);
                self.counts.fixes += 1;
                Dispatched::Gps { fix, stored }
            }
            Err(gps_err) => {
                log::debug!("not a bearing ({}), not GPS ({})", bearing_err, gps_err);
                self.counts.unhandled += 1;
                self.unhandled.unhandled(line, &gps_err);
                Dispatched::Unhandled(gps_err)
            }
        }
    }

    fn store_fix(&mut self, fix: &GpsFix) -> bool {
        let keep_previous = self.policy == FixPolicy::KeepLastGood
            && !fix.status_good
            && self.readings.fix.as_ref().is_some_and(|f| f.status_good);
        if keep_previous {
            log::debug!("keeping last good fix over status-not-good {}", fix.utc_time);
            return false;
        }
        self.readings.fix = Some(fix.clone());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentence::with_checksum;
    use std::sync::{Arc, Mutex};

    const RMC: &str = "$GPRMC,180747.00,A,4814.67617,N,12245.53305,W,0.059,,250217,,,A*68";

    fn recording_dispatcher(policy: FixPolicy) -> (Dispatcher, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let dispatcher = Dispatcher::new(GpsDecoder::default(), policy)
            .with_unhandled_handler(move |line: &str, _: &GpsError| {
                sink.lock().unwrap().push(line.to_string());
            });
        (dispatcher, seen)
    }

    #[test]
    fn test_bearing_line_published() {
        let mut d = Dispatcher::default();
        assert!(matches!(d.dispatch("%240/7\r"), Dispatched::Bearing(_)));
        let reading = d.readings().bearing().unwrap();
        assert_eq!(reading.bearing, "240");
        assert_eq!(reading.quality, "7");
        assert_eq!(d.last_protocol(), Some(Protocol::Bearing));
    }

    #[test]
    fn test_non_bearing_falls_through_to_gps() {
        let mut d = Dispatcher::default();
        match d.dispatch(RMC) {
            Dispatched::Gps { fix, stored } => {
                assert!(stored);
                assert_eq!(fix.latitude, "4814.67617N");
            }
            other => panic!("expected GPS dispatch, got {:?}", other),
        }
        assert!(d.readings().bearing().is_none());
        assert_eq!(d.last_protocol(), Some(Protocol::Gps));
    }

    #[test]
    fn test_garbage_forwarded_once() {
        let (mut d, seen) = recording_dispatcher(FixPolicy::LatestWins);
        assert!(matches!(d.dispatch("garbage\n"), Dispatched::Unhandled(_)));
        assert_eq!(*seen.lock().unwrap(), vec!["garbage".to_string()]);
        assert!(d.readings().is_empty());
        assert_eq!(d.last_protocol(), None);
        assert_eq!(d.counts().unhandled, 1);
    }

    #[test]
    fn test_unknown_gps_and_bad_checksum_unhandled() {
        let (mut d, seen) = recording_dispatcher(FixPolicy::LatestWins);
        d.dispatch("$GPGGA,092750.000,5321.6802,N,00630.3372,W,1,8,1.03,61.7,M,55.2,M,,*76");
        d.dispatch(&RMC.replace("*68", "*00"));
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert!(d.readings().fix().is_none());
    }

    #[test]
    fn test_empty_line_ignored() {
        let (mut d, seen) = recording_dispatcher(FixPolicy::LatestWins);
        assert_eq!(d.dispatch("\r\n"), Dispatched::Empty);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(d.counts().lines, 0);
    }

    #[test]
    fn test_latest_wins_overwrites_good_fix() {
        let mut d = Dispatcher::default();
        d.dispatch(RMC);
        let void = with_checksum("GPRMC,180800.00,V,,,,,,,250217,,,N");
        assert!(matches!(d.dispatch(&void), Dispatched::Gps { stored: true, .. }));
        let fix = d.readings().fix().unwrap();
        assert!(!fix.status_good, "latest fix replaces the good one");
        assert_eq!(fix.utc_time, "180800.00");
    }

    #[test]
    fn test_keep_last_good_preserves_position() {
        let mut d = Dispatcher::new(GpsDecoder::default(), FixPolicy::KeepLastGood);
        let void = with_checksum("GPRMC,180700.00,V,,,,,,,250217,,,N");
        // With nothing stored, a bad fix is still kept
        assert!(matches!(d.dispatch(&void), Dispatched::Gps { stored: true, .. }));
        d.dispatch(RMC);
        let later_void = with_checksum("GPRMC,180800.00,V,,,,,,,250217,,,N");
        assert!(matches!(d.dispatch(&later_void), Dispatched::Gps { stored: false, .. }));
        let fix = d.readings().fix().unwrap();
        assert!(fix.status_good);
        assert_eq!(fix.utc_time, "180747.00");
    }

    #[test]
    fn test_arrival_order_latest_bearing() {
        let mut d = Dispatcher::default();
        for line in ["%010/1", RMC, "%020/2", "noise", "%030/3"] {
            d.dispatch(line);
        }
        assert_eq!(d.readings().bearing().unwrap().bearing, "030");
        assert_eq!(d.counts(), DispatchCounts { lines: 5, bearings: 3, fixes: 1, unhandled: 1 });
        assert_eq!(d.last_protocol(), Some(Protocol::Bearing));
    }

    #[test]
    fn test_hostile_input_never_panics() {
        let mut d = Dispatcher::default();
        let long = "$".repeat(10_000);
        let hostile = [
            "%",
            "$",
            "*",
            "$*",
            "%/",
            "\u{0}\u{1}\u{2}",
            "$GPRMC,*zz",
            long.as_str(),
            "%\u{00e9}\u{00e9}",
        ];
        for line in hostile {
            d.dispatch(line);
        }
    }
}
