use serde::{Deserialize, Serialize};

/// Negative bounds make the interval unconditional; `begin >= end` wraps
/// past midnight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interval {
    pub begin: i32,
    pub end: i32,
    #[serde(default = "default_status")]
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<f64>,
}

fn default_status() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Demand {
    Off,
    Heat { target: Option<f64> },
}

impl Demand {
    pub fn is_on(self) -> bool {
        matches!(self, Self::Heat { .. })
    }

    pub fn target(self) -> Option<f64> {
        match self {
            Self::Heat { target } => target,
            Self::Off => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub demand: Demand,
    pub override_expired: bool,
}

pub fn contains(hm: i32, begin: i32, end: i32) -> bool {
    if begin < 0 || end < 0 {
        return true;
    }
    if begin < end {
        begin <= hm && hm < end
    } else {
        hm >= begin || hm < end
    }
}

fn valid_hhmm(value: i32) -> bool {
    (0..2400).contains(&value) && value % 100 < 60
}

impl Interval {
    pub fn unconditional(status: bool, temp: Option<f64>) -> Self {
        Self {
            begin: -1,
            end: -1,
            status,
            temp,
        }
    }

    pub fn is_unconditional(&self) -> bool {
        self.begin < 0 || self.end < 0
    }

    pub fn validate(&self) -> bool {
        let bounds = self.is_unconditional() || (valid_hhmm(self.begin) && valid_hhmm(self.end));
        bounds && self.temp.map(f64::is_finite).unwrap_or(true)
    }

    pub fn contains(&self, hm: i32) -> bool {
        contains(hm, self.begin, self.end)
    }

    /// Overrides span less than a day, so once the window is left at or after
    /// `end` it is over. Before `begin` it is merely pending.
    pub fn has_expired(&self, hm: i32) -> bool {
        !self.is_unconditional() && !self.contains(hm) && hm >= self.end
    }

    pub fn demand(&self) -> Demand {
        if self.status {
            Demand::Heat { target: self.temp }
        } else {
            Demand::Off
        }
    }
}

pub fn normalize_program(program: &mut Vec<Interval>) {
    program.retain(Interval::validate);
    program.sort_by_key(|interval| (interval.begin, interval.end));
}

pub fn resolve(hm: i32, program: &[Interval], override_program: Option<&Interval>) -> Resolution {
    let mut override_expired = false;

    if let Some(active) = override_program {
        if active.contains(hm) {
            return Resolution {
                demand: active.demand(),
                override_expired: false,
            };
        }
        override_expired = active.has_expired(hm);
    }

    let demand = program
        .iter()
        .find(|interval| interval.status && interval.contains(hm))
        .map(Interval::demand)
        .unwrap_or(Demand::Off);

    Resolution {
        demand,
        override_expired,
    }
}
