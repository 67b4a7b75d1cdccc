use std::str::FromStr;

use bitflags::bitflags;

use crate::QueryLogError;

bitflags! {
    /// Which query-log events a logger records.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueryLogFlags: u32 {
        const COMMAND = 1 << 0;
        const RESULT_CODE = 1 << 1;
        const DESTINATION = 1 << 2;
        const CACHE = 1 << 3;
        const SIZE = 1 << 4;
        const SCORE = 1 << 5;
        const ALL = Self::COMMAND.bits()
            | Self::RESULT_CODE.bits()
            | Self::DESTINATION.bits()
            | Self::CACHE.bits()
            | Self::SIZE.bits()
            | Self::SCORE.bits();
        const DEFAULT = Self::ALL.bits();
    }
}

/// Input accepted by [`QueryLogFlags::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagSpec<'a> {
    /// Nothing given: keep the base flags.
    Unset,
    /// Raw bits.
    Bits(u32),
    /// One flag name.
    Name(&'a str),
    /// Union of flag names.
    Names(&'a [&'a str]),
    /// Named flags switched on or off on top of the base flags.
    Toggles(&'a [(&'a str, bool)]),
}

impl QueryLogFlags {
    pub const NONE: Self = Self::empty();

    /// Looks up a single flag by its case-insensitive name.
    pub fn from_name(name: &str) -> Result<Self, QueryLogError> {
        let flags = match name.to_ascii_lowercase().as_str() {
            "none" => Self::NONE,
            "command" => Self::COMMAND,
            "result_code" => Self::RESULT_CODE,
            "destination" => Self::DESTINATION,
            "cache" => Self::CACHE,
            "size" => Self::SIZE,
            "score" => Self::SCORE,
            "all" => Self::ALL,
            "default" => Self::DEFAULT,
            _ => return Err(QueryLogError::UnknownFlag(name.to_owned())),
        };
        Ok(flags)
    }

    /// Resolves `spec` against `base`.
    ///
    /// # Errors
    ///
    /// [`QueryLogError::UnknownFlag`] for a name that is not a flag.
    pub fn parse(spec: FlagSpec<'_>, base: Self) -> Result<Self, QueryLogError> {
        match spec {
            FlagSpec::Unset => Ok(base),
            FlagSpec::Bits(bits) => Ok(Self::from_bits_retain(bits)),
            FlagSpec::Name(name) => Self::from_name(name),
            FlagSpec::Names(names) => names
                .iter()
                .try_fold(Self::NONE, |acc, n| Ok(acc | Self::from_name(n)?)),
            FlagSpec::Toggles(toggles) => {
                let mut flags = base;
                for &(name, on) in toggles {
                    flags.set(Self::from_name(name)?, on);
                }
                Ok(flags)
            }
        }
    }
}

/// Parses `|`-separated flag names, e.g. `"command|result_code"`.
impl FromStr for QueryLogFlags {
    type Err = QueryLogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split('|')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .try_fold(Self::NONE, |acc, n| Ok(acc | Self::from_name(n)?))
    }
}
