use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LocaleKey {
    #[default]
    EnUs,
    PtBr,
}

impl LocaleKey {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "en_US" | "en" => Some(Self::EnUs),
            "pt_BR" | "pt" => Some(Self::PtBr),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnUs => "en_US",
            Self::PtBr => "pt_BR",
        }
    }
}

impl fmt::Display for LocaleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Draw a `String` from the `fake` faker `$module::$faker` of the given locale.
macro_rules! localized {
    ($locale:expr, $rng:expr, $module:ident :: $faker:ident ( $($arg:expr),* )) => {{
        let value: String = match $locale {
            $crate::faker_rs::locales::LocaleKey::EnUs => {
                fake::faker::$module::en::$faker($($arg),*).fake_with_rng($rng)
            }
            $crate::faker_rs::locales::LocaleKey::PtBr => {
                fake::faker::$module::pt_br::$faker($($arg),*).fake_with_rng($rng)
            }
        };
        value
    }};
}

pub(crate) use localized;
