use crate::dial::error::{DialError, Result};
use crate::dial::field::{DialField, Direction, LockableField, BPS_PER_MBPS};
use std::str::FromStr;

/// The four linked dials of one test direction.
///
/// Bandwidth is held in Mbps, as the dial shows it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DialSet {
    sec: f64,
    size: f64,
    pkt: f64,
    bw: f64,
    locked: LockableField,
}

impl Default for DialSet {
    fn default() -> Self {
        Self {
            sec: 3.0,
            size: 1000.0,
            pkt: 30.0,
            bw: 0.08,
            locked: LockableField::Size,
        }
    }
}

impl DialSet {
    /// Build a consistent set from duration, packet size and packet count;
    /// bandwidth is derived.
    pub fn from_parameters(params: TestParameters) -> Self {
        let mut set = Self {
            sec: DialField::Seconds.normalize(params.sec),
            size: DialField::Size.normalize(params.size),
            pkt: DialField::PacketCount.normalize(params.pkt),
            bw: 0.0,
            locked: LockableField::Size,
        };
        set.bw = DialField::Bandwidth.normalize(set.derive(DialField::Bandwidth));
        set
    }

    pub fn get(&self, field: DialField) -> f64 {
        match field {
            DialField::Seconds => self.sec,
            DialField::Size => self.size,
            DialField::PacketCount => self.pkt,
            DialField::Bandwidth => self.bw,
        }
    }

    pub(crate) fn set(&mut self, field: DialField, value: f64) {
        match field {
            DialField::Seconds => self.sec = value,
            DialField::Size => self.size = value,
            DialField::PacketCount => self.pkt = value,
            DialField::Bandwidth => self.bw = value,
        }
    }

    pub fn locked(&self) -> LockableField {
        self.locked
    }

    pub(crate) fn lock(&mut self, field: LockableField) {
        self.locked = field;
    }

    /// True when the dial cannot be edited by the user
    pub fn is_locked(&self, field: DialField) -> bool {
        self.locked.field() == field
    }

    pub fn seconds(&self) -> f64 {
        self.sec
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn packets(&self) -> f64 {
        self.pkt
    }

    /// Bandwidth dial value in Mbps
    pub fn bandwidth_mbps(&self) -> f64 {
        self.bw
    }

    /// Bandwidth dial value in bits per second
    pub fn bandwidth_bps(&self) -> f64 {
        self.bw * BPS_PER_MBPS
    }

    /// Target rate in bits per second computed from duration, size and count.
    ///
    /// This is what the test client is asked to send, independent of the
    /// rounding applied to the bandwidth dial.
    pub fn target_bps(&self) -> f64 {
        self.pkt * self.size * 8.0 / self.sec
    }

    /// Raw value of `field` solved from the other three dials, before the
    /// field's precision is applied. Divisions by zero yield non-finite
    /// values, which callers must reject.
    pub fn derive(&self, field: DialField) -> f64 {
        let bw_bps = self.bandwidth_bps();
        match field {
            DialField::Seconds => self.pkt * self.size * 8.0 / bw_bps,
            DialField::Size => bw_bps * self.sec / (self.pkt * 8.0),
            DialField::PacketCount => bw_bps * self.sec / (self.size * 8.0),
            DialField::Bandwidth => self.pkt * self.size * 8.0 / self.sec / BPS_PER_MBPS,
        }
    }

    /// Difference in bits between what is sent and what the rate allows
    pub fn residual_bits(&self) -> f64 {
        (self.pkt * self.size * 8.0 - self.bandwidth_bps() * self.sec).abs()
    }

    /// Fail on the first dial outside its range
    pub fn check_ranges(&self) -> Result<()> {
        for field in DialField::ALL {
            let value = self.get(field);
            if !field.accepts(value) {
                return Err(DialError::OutOfRange {
                    field: field.label().to_string(),
                    value,
                    min: field.min(),
                    max: field.max(),
                });
            }
        }
        Ok(())
    }

    /// Command argument for the test client, e.g. `-cs=3,1000,30,80000bps`
    pub fn bwtest_arg(&self, direction: Direction) -> String {
        format!(
            "{}={},{},{},{}bps",
            direction.flag(),
            self.sec,
            self.size,
            self.pkt,
            self.target_bps().trunc()
        )
    }

    /// Human summary, e.g. `cs: 3s, 1000b x 30 pkts, 0.08 Mbps`
    pub fn param_line(&self, direction: Direction) -> String {
        format!(
            "{}: {}s, {}b x {} pkts, {} Mbps",
            direction.tag(),
            self.sec,
            self.size,
            self.pkt,
            self.bw
        )
    }
}

/// Duration, packet size and packet count as typed on the command line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestParameters {
    pub sec: f64,
    pub size: f64,
    pub pkt: f64,
}

impl FromStr for TestParameters {
    type Err = DialError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DialError::InvalidParameters {
            input: s.to_string(),
        };
        let values = s
            .split(',')
            .map(|part| part.trim().parse::<f64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>>>()?;
        match values.as_slice() {
            &[sec, size, pkt] => Ok(Self { sec, size, pkt }),
            _ => Err(invalid()),
        }
    }
}
