use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(CustomerId);
id_newtype!(ImportId);

/// A closed set of values that free-form strings are folded into.
///
/// `parse` accepts only recognized spellings (case-insensitive, plus a few
/// aliases); `normalize` never fails and maps anything unrecognized to
/// `FALLBACK`.
pub trait Category: Sized + Copy + Eq + Ord + 'static {
    const ALL: &'static [Self];
    const FALLBACK: Self;

    /// Wire spelling.
    fn as_str(self) -> &'static str;

    fn label(self) -> &'static str;

    /// Folds raw input into the key compared against the wire spellings.
    fn canonical_key(raw: &str) -> String {
        raw.to_lowercase()
    }

    fn parse(raw: &str) -> Option<Self> {
        let key = Self::canonical_key(raw);
        Self::ALL
            .iter()
            .copied()
            .find(|value| value.as_str().eq_ignore_ascii_case(&key))
    }

    fn normalize(raw: &str) -> Self {
        Self::parse(raw).unwrap_or(Self::FALLBACK)
    }
}

macro_rules! category_enum {
    (
        $(#[$meta:meta])*
        $name:ident, fallback = $fallback:ident $(, key = $key_fn:path)? {
            $($variant:ident => ($wire:literal, $label:literal)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(from = "String")]
        pub enum $name {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl Category for $name {
            const ALL: &'static [Self] = &[$($name::$variant),+];
            const FALLBACK: Self = $name::$fallback;

            fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }

            fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }

            $(
                fn canonical_key(raw: &str) -> String {
                    $key_fn(raw)
                }
            )?
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                <Self as Category>::as_str(self)
            }

            pub fn label(self) -> &'static str {
                <Self as Category>::label(self)
            }

            pub fn parse(raw: &str) -> Option<Self> {
                <Self as Category>::parse(raw)
            }

            pub fn normalize(raw: &str) -> Self {
                <Self as Category>::normalize(raw)
            }

            pub fn all() -> &'static [Self] {
                <Self as Category>::ALL
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                <Self as Category>::normalize(&raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

fn interest_key(raw: &str) -> String {
    let key = raw.to_lowercase();
    if key == "social media" {
        "socialmedia".to_string()
    } else {
        key
    }
}

fn location_key(raw: &str) -> String {
    let key: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect();
    // Misspelling seen in imported datasets.
    if key == "suburan" {
        "suburban".to_string()
    } else {
        key
    }
}

category_enum!(
    Gender, fallback = Other {
        Male => ("male", "Male"),
        Female => ("female", "Female"),
        Other => ("other", "Other"),
    }
);

category_enum!(
    DeviceBrand, fallback = Other {
        Samsung => ("samsung", "Samsung"),
        Apple => ("apple", "Apple"),
        Huawei => ("huawei", "Huawei"),
        Xiaomi => ("xiaomi", "Xiaomi"),
        Oppo => ("oppo", "Oppo"),
        Vivo => ("vivo", "Vivo"),
        Other => ("other", "Other"),
    }
);

category_enum!(
    DigitalInterest, fallback = Other, key = interest_key {
        SocialMedia => ("socialMedia", "Social Media"),
        Gaming => ("gaming", "Gaming"),
        Shopping => ("shopping", "Shopping"),
        News => ("news", "News"),
        Entertainment => ("entertainment", "Entertainment"),
        Education => ("education", "Education"),
        Health => ("health", "Health"),
        Finance => ("finance", "Finance"),
        Travel => ("travel", "Travel"),
        Food => ("food", "Food"),
        Other => ("other", "Other"),
    }
);

category_enum!(
    /// Unrecognized input folds to `Urban`; the other categories fold to
    /// `Other`.
    LocationType, fallback = Urban, key = location_key {
        Urban => ("urban", "Urban"),
        Suburban => ("suburban", "Suburban"),
        Rural => ("rural", "Rural"),
    }
);

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
