//! Operational mode and the read/mutate guard.
//!
//! The mode is fixed at startup from `APP_MODE` and never changes while the
//! process runs. Every gateway operation is statically classified as
//! [`OpClass::Read`] or [`OpClass::Mutate`]; the guard decides per call
//! whether to hit the vendor, answer synthetically, or refuse outright.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Process-wide operational mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// No vendor core attached. Reads are answered by the simulated
    /// connector, mutations return fabricated acknowledgements.
    Sim,
    /// Vendor core attached for reads; trading mutations are simulated and
    /// annotated as mode-refused.
    LiveRo,
    /// Vendor core attached, mutations permitted.
    LiveRw,
}

impl Mode {
    /// Environment variable consulted by [`Mode::from_env`].
    pub const ENV_VAR: &'static str = "APP_MODE";

    /// Reads the mode from `APP_MODE`, defaulting to [`Mode::Sim`].
    ///
    /// An unrecognised value falls back to `Sim` rather than erroring so a
    /// misconfigured deployment cannot accidentally trade.
    pub fn from_env() -> Self {
        std::env::var(Self::ENV_VAR)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Mode::Sim)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Sim => "sim",
            Mode::LiveRo => "live_ro",
            Mode::LiveRw => "live_rw",
        }
    }

    /// Whether a vendor core is attached in this mode.
    pub fn vendor_attached(&self) -> bool {
        !matches!(self, Mode::Sim)
    }

    /// Gate an operation of the given class.
    pub fn check(&self, class: OpClass) -> Gate {
        match (self, class) {
            (Mode::Sim, _) => Gate::Simulate { mode_refused: false },
            (Mode::LiveRo, OpClass::Read) => Gate::Allow,
            (Mode::LiveRo, OpClass::Mutate) => Gate::Simulate { mode_refused: true },
            (Mode::LiveRw, _) => Gate::Allow,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sim" | "mock" => Ok(Mode::Sim),
            "live_ro" | "dev" => Ok(Mode::LiveRo),
            "live_rw" | "prod" => Ok(Mode::LiveRw),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Static classification of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    /// Queries and subscriptions. Permitted whenever a data source exists.
    Read,
    /// Order placement and cancellation, sync or async.
    Mutate,
}

/// Decision produced by the mode guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Run the operation against the attached vendor core.
    Allow,
    /// Answer from the synthetic path. `mode_refused` marks responses that
    /// exist only because the mode forbids the real operation, so callers
    /// can tell simulation from success.
    Simulate { mode_refused: bool },
    /// Reject the operation outright (configuration-level refusal).
    Refuse,
}

impl Gate {
    pub fn is_simulated(&self) -> bool {
        matches!(self, Gate::Simulate { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_table() {
        assert_eq!(
            Mode::Sim.check(OpClass::Read),
            Gate::Simulate { mode_refused: false }
        );
        assert_eq!(
            Mode::Sim.check(OpClass::Mutate),
            Gate::Simulate { mode_refused: false }
        );
        assert_eq!(Mode::LiveRo.check(OpClass::Read), Gate::Allow);
        assert_eq!(
            Mode::LiveRo.check(OpClass::Mutate),
            Gate::Simulate { mode_refused: true }
        );
        assert_eq!(Mode::LiveRw.check(OpClass::Read), Gate::Allow);
        assert_eq!(Mode::LiveRw.check(OpClass::Mutate), Gate::Allow);
    }

    #[test]
    fn parse_accepts_legacy_aliases() {
        assert_eq!("sim".parse::<Mode>().unwrap(), Mode::Sim);
        assert_eq!("mock".parse::<Mode>().unwrap(), Mode::Sim);
        assert_eq!("LIVE_RO".to_lowercase().parse::<Mode>().unwrap(), Mode::LiveRo);
        assert_eq!("prod".parse::<Mode>().unwrap(), Mode::LiveRw);
        assert!("paper".parse::<Mode>().is_err());
    }

    #[test]
    fn display_round_trip() {
        for mode in [Mode::Sim, Mode::LiveRo, Mode::LiveRw] {
            assert_eq!(mode.as_str().parse::<Mode>().unwrap(), mode);
        }
    }
}
