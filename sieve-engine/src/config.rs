//! Cross-cutting engine knobs: the CPU budget, the per-compile error cap,
//! plus the compile/execute flag bits named individually below.

use std::time::Duration;

/// `EngineConfig`: defaults chosen to match common deployments rather than
/// any one host's specific policy.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_errors_per_compile: usize,
    pub max_cpu_time: Duration,
    pub max_redirects: usize,
    pub max_header_name_len: usize,
    pub default_comparator: &'static str,
    pub default_match_type: &'static str,
    pub default_address_part: &'static str,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_errors_per_compile: 100,
            max_cpu_time: Duration::from_secs(30),
            max_redirects: 1,
            max_header_name_len: 256,
            default_comparator: "i;ascii-casemap",
            default_match_type: "is",
            default_address_part: "all",
        }
    }
}

macro_rules! flag_bits {
    ($name:ident { $($variant:ident = $bit:expr),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name(u32);

        impl $name {
            $(pub const $variant: $name = $name($bit);)+

            pub const NONE: $name = $name(0);

            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }
    };
}

flag_bits!(CompileFlags {
    NO_ENVELOPE = 0b0001,
    NO_GLOBAL_VARS = 0b0010,
    NO_RUNLOG = 0b0100,
    DEBUG = 0b1000,
});

flag_bits!(ExecuteFlags {
    NO_DELIVERY = 0b0001,
    LOG_RESULT = 0b0010,
    DEFER_KEEP = 0b0100,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_combination_contains_each_bit() {
        let flags = CompileFlags::NO_ENVELOPE | CompileFlags::DEBUG;
        assert!(flags.contains(CompileFlags::NO_ENVELOPE));
        assert!(flags.contains(CompileFlags::DEBUG));
        assert!(!flags.contains(CompileFlags::NO_GLOBAL_VARS));
    }
}
