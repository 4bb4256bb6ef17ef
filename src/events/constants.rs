//! The fixed table of non-event identifiers a formula may reference.
//!
//! See SPEC_FULL.md §3, "Constants", and §4.3 step (d).

/// A platform constant recognized by the formula compiler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Constant {
    Tsc,
    SystemTscFreq,
    CoresPerSocket,
    ChasPerSocket,
    SocketCount,
    HyperthreadingOn,
    ConstThreadCount,
    Txn,
    DurationTimeInSeconds,
    DurationTimeInMilliseconds,
}

impl Constant {
    /// Parse a bracketed identifier as a constant, if it names one.
    pub fn from_name(name: &str) -> Option<Constant> {
        Some(match name {
            "TSC" => Constant::Tsc,
            "SYSTEM_TSC_FREQ" => Constant::SystemTscFreq,
            "CORES_PER_SOCKET" => Constant::CoresPerSocket,
            "CHAS_PER_SOCKET" => Constant::ChasPerSocket,
            "SOCKET_COUNT" => Constant::SocketCount,
            "HYPERTHREADING_ON" => Constant::HyperthreadingOn,
            "CONST_THREAD_COUNT" => Constant::ConstThreadCount,
            "TXN" => Constant::Txn,
            "DURATIONTIMEINSECONDS" => Constant::DurationTimeInSeconds,
            "DURATIONTIMEINMILLISECONDS" => Constant::DurationTimeInMilliseconds,
            _ => return None,
        })
    }

    /// The catalog's fixed whitelist of constants excluded from the
    /// not-found warning path in SPEC_FULL.md §4.4 ("Uncollectable-event
    /// handling"). Only `TSC` is whitelisted there today.
    pub fn is_exempt_from_not_found_warning(name: &str) -> bool {
        name == "TSC"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_every_named_constant() {
        for name in [
            "TSC",
            "SYSTEM_TSC_FREQ",
            "CORES_PER_SOCKET",
            "CHAS_PER_SOCKET",
            "SOCKET_COUNT",
            "HYPERTHREADING_ON",
            "CONST_THREAD_COUNT",
            "TXN",
            "DURATIONTIMEINSECONDS",
            "DURATIONTIMEINMILLISECONDS",
        ] {
            assert!(Constant::from_name(name).is_some(), "{name} not recognized");
        }
        assert_eq!(Constant::from_name("INST_RETIRED.ANY"), None);
    }
}
