//! The `strcmp_cpuid_str` formula intrinsic, used by ARM component catalog
//! formulas to gate a metric on the running CPU's MIDR_EL1 value.
//!
//! See SPEC_FULL.md §4.3 step (e) and the GLOSSARY entry for "CPUID match".

const VARIANT_MASK: u64 = 0xF << 20;
const REVISION_MASK: u64 = 0xF;

/// Whether `current` (the running CPU's MIDR_EL1) matches `pattern` (the
/// MIDR_EL1 literal written in a formula).
///
/// Two MIDR values match when their implementer/architecture/part-number
/// bits (everything outside the variant and revision fields) are equal,
/// their variant fields are equal, and the current revision is at least
/// the pattern's revision — a formula written against silicon revision N
/// also matches any later-stepping part of the same variant.
pub fn cpuid_matches(pattern: u64, current: u64) -> bool {
    let type_mask = !(VARIANT_MASK | REVISION_MASK);
    if pattern & type_mask != current & type_mask {
        return false;
    }
    if pattern & VARIANT_MASK != current & VARIANT_MASK {
        return false;
    }
    (current & REVISION_MASK) >= (pattern & REVISION_MASK)
}

/// Parse a `strcmp_cpuid_str` argument literal (e.g. `"0x410fd490"`) into a
/// MIDR value.
pub fn parse_cpuid_literal(text: &str) -> Option<u64> {
    let trimmed = text.trim();
    let hex = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X"))?;
    u64::from_str_radix(hex, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_type_and_variant_with_later_revision_matches() {
        let pattern = 0x410fd490;
        let later_stepping = 0x410fd491;
        assert!(cpuid_matches(pattern, later_stepping));
    }

    #[test]
    fn earlier_revision_does_not_match() {
        let pattern = 0x410fd491;
        let earlier_stepping = 0x410fd490;
        assert!(!cpuid_matches(pattern, earlier_stepping));
    }

    #[test]
    fn different_implementer_does_not_match() {
        let pattern = 0x410fd490;
        let other_implementer = 0x430fd490;
        assert!(!cpuid_matches(pattern, other_implementer));
    }

    #[test]
    fn different_variant_does_not_match() {
        let pattern = 0x410fd490;
        let other_variant = 0x411fd490;
        assert!(!cpuid_matches(pattern, other_variant));
    }

    #[test]
    fn parses_hex_literal() {
        assert_eq!(parse_cpuid_literal("\"0x410fd490\""), None);
        assert_eq!(parse_cpuid_literal("0x410fd490"), Some(0x410fd490));
    }
}
