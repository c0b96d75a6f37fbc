//! Runtime memory configuration.

use crate::memory::{NUM_PHYS_PAGES, PAGE_IO_DELAY_TICKS, PAGE_SIZE, USER_STACK_SIZE};
use core::fmt;
use core::str::FromStr;
use kernel_memory_addresses::PageSize;

/// Which frame is chosen when a page must be brought into memory.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum ReplacementKind {
    /// Hand out frames in increasing order; running out is fatal.
    #[default]
    NoReplacement,
    /// Pick a uniformly random evictable frame.
    Random,
    /// Second-chance sweep over the frames' reference bits.
    Clock,
}

impl ReplacementKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoReplacement => "none",
            Self::Random => "random",
            Self::Clock => "clock",
        }
    }
}

impl fmt::Display for ReplacementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("unknown replacement policy (expected one of: none, random, clock)")]
pub struct ParseReplacementError;

impl FromStr for ReplacementKind {
    type Err = ParseReplacementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "no-replacement" => Ok(Self::NoReplacement),
            "random" => Ok(Self::Random),
            "clock" => Ok(Self::Clock),
            _ => Err(ParseReplacementError),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("page size must be non-zero")]
    ZeroPageSize,
    #[error("physical memory must have at least one frame")]
    NoFrames,
    #[error("user stack ({stack} bytes) does not fit above the stack guard")]
    StackTooSmall { stack: usize },
}

/// Parameters of the simulated memory system.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MemoryConfig {
    /// Bytes per page and frame.
    pub page_size: usize,
    /// Number of physical frames.
    pub num_frames: usize,
    /// Stack bytes appended to every executable's image.
    pub user_stack_size: usize,
    /// Ticks charged for one page transfer.
    pub io_delay_ticks: u64,
    pub replacement: ReplacementKind,
    /// Seed for the random policy.
    pub random_seed: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            num_frames: NUM_PHYS_PAGES,
            user_stack_size: USER_STACK_SIZE,
            io_delay_ticks: PAGE_IO_DELAY_TICKS,
            replacement: ReplacementKind::default(),
            random_seed: 0,
        }
    }
}

impl MemoryConfig {
    /// Checks the configuration and returns the page size.
    ///
    /// # Errors
    /// Zero page size, zero frames, or a stack that cannot hold the initial
    /// stack-pointer guard.
    pub const fn validate(&self) -> Result<PageSize, ConfigError> {
        let Some(page_size) = PageSize::new(self.page_size) else {
            return Err(ConfigError::ZeroPageSize);
        };
        if self.num_frames == 0 {
            return Err(ConfigError::NoFrames);
        }
        if self.user_stack_size <= crate::memory::STACK_GUARD_BYTES {
            return Err(ConfigError::StackTooSmall {
                stack: self.user_stack_size,
            });
        }
        Ok(page_size)
    }

    /// Total bytes of physical memory.
    #[must_use]
    pub const fn memory_bytes(&self) -> usize {
        self.page_size * self.num_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_constants() {
        let config = MemoryConfig::default();
        assert_eq!(config.validate().map(PageSize::bytes), Ok(PAGE_SIZE));
        assert_eq!(config.memory_bytes(), PAGE_SIZE * NUM_PHYS_PAGES);
        assert_eq!(config.replacement, ReplacementKind::NoReplacement);
    }

    #[test]
    fn rejects_degenerate_values() {
        let zero_page = MemoryConfig {
            page_size: 0,
            ..MemoryConfig::default()
        };
        assert_eq!(zero_page.validate(), Err(ConfigError::ZeroPageSize));

        let no_frames = MemoryConfig {
            num_frames: 0,
            ..MemoryConfig::default()
        };
        assert_eq!(no_frames.validate(), Err(ConfigError::NoFrames));

        let tiny_stack = MemoryConfig {
            user_stack_size: 8,
            ..MemoryConfig::default()
        };
        assert_eq!(
            tiny_stack.validate(),
            Err(ConfigError::StackTooSmall { stack: 8 })
        );
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("clock".parse(), Ok(ReplacementKind::Clock));
        assert_eq!("random".parse(), Ok(ReplacementKind::Random));
        assert_eq!("none".parse(), Ok(ReplacementKind::NoReplacement));
        assert_eq!(
            "lru".parse::<ReplacementKind>(),
            Err(ParseReplacementError)
        );
        assert_eq!(
            "fifo".parse::<ReplacementKind>(),
            Err(ParseReplacementError)
        );
        assert_eq!(ReplacementKind::Clock.to_string(), "clock");
    }
}
