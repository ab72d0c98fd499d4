// Copyright 2025 The NativeLink Authors. All rights reserved.
//
// Licensed under the Functional Source License, Version 1.1, Apache 2.0 Future License (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    See LICENSE file for details
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Utilities for deserializing types with intermediate shell-expansion.

use core::fmt::Display;
use core::marker::PhantomData;
use core::str::FromStr;
use core::time::Duration;

use serde::{Deserialize, Deserializer, de};
use serde_with::{DeserializeAs, Same, SerializeAs, serde_as};

/// Utility type that invokes shell-expansion if it detects a string.
///
/// The orchestrator hands every plugin setting over as a string, so in
/// practice nearly every value in a [`crate::snapshot::PluginSpec`] goes
/// through this path.
///
/// ```rust
/// # use serde::Deserialize;
/// # use serde_with::serde_as;
/// # use pxsnap_config::deser::ShellExpand;
///
/// #[serde_as]
/// #[derive(Deserialize)]
/// struct Credentials {
///     #[serde_as(as = "ShellExpand")]
///     secret: String,
///
///     #[serde_as(as = "ShellExpand")]
///     retries: usize,
/// }
///
/// unsafe { std::env::set_var("PXSNAP_DOC_SECRET", "hunter2") };
///
/// let Credentials { secret, retries } = serde_json5::from_str(r#"{
///     secret: "$PXSNAP_DOC_SECRET",
///     retries: "3",
/// }"#).unwrap();
///
/// assert_eq!(secret, "hunter2");
/// assert_eq!(retries, 3);
/// ```
///
/// The second type parameter controls parsing of the expanded string. By
/// default values are parsed via [`FromStr::from_str()`];
/// [`ShellExpandSeconds`] parses either a bare number of seconds or a
/// human-readable duration such as `"5m30s"`.
pub struct ShellExpand<De = Same, Conv = Same>(PhantomData<(De, Conv)>);

pub trait ShellExpandable<T> {
    fn convert<'de, D: Deserializer<'de>>(s: &str) -> Result<T, D::Error>;
}

impl<'de, De, Conv, T> DeserializeAs<'de, T> for ShellExpand<De, Conv>
where
    De: DeserializeAs<'de, T>,
    Conv: ShellExpandable<T>,
{
    fn deserialize_as<D>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
    {
        /// Catches strings in the `String` variant and deserializes everything
        /// else in the `Or` variant via `A::deserialize_as::<B>()`.
        #[serde_as]
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StringOr<A, B> {
            /// Variant required to make `StringOr` "act" like it owns an `A`.
            #[serde(skip)]
            _A(PhantomData<A>),

            String(String),

            Or(
                #[serde_as(as = "A")]
                #[serde(bound(deserialize = "A: DeserializeAs<'de, B>"))]
                B,
            ),
        }

        match StringOr::<De, T>::deserialize(deserializer)? {
            StringOr::_A(_) => unreachable!("serde skips deserializing this variant"),
            StringOr::String(s) => {
                let expanded = shellexpand::env(&s).map_err(de::Error::custom)?;
                Conv::convert::<D>(&expanded)
            }
            StringOr::Or(t) => Ok(t),
        }
    }
}

impl<Se, Conv, T: ?Sized> SerializeAs<T> for ShellExpand<Se, Conv>
where
    Se: SerializeAs<T>,
{
    fn serialize_as<S>(source: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        Se::serialize_as(source, serializer)
    }
}

impl<T> ShellExpandable<T> for Same
where
    T: FromStr<Err: Display>,
{
    fn convert<'de, D: Deserializer<'de>>(s: &str) -> Result<T, D::Error> {
        T::from_str(s.trim()).map_err(de::Error::custom)
    }
}

impl<T> ShellExpandable<T> for Duration
where
    u64: TryInto<T, Error: Display>,
{
    fn convert<'de, D: Deserializer<'de>>(s: &str) -> Result<T, D::Error> {
        let s = s.trim();
        let secs = match s.parse::<u64>() {
            Ok(secs) => secs,
            Err(_) => humantime::parse_duration(s)
                .map_err(de::Error::custom)?
                .as_secs(),
        };
        secs.try_into().map_err(de::Error::custom)
    }
}

pub type ShellExpandSeconds<De = Same> = ShellExpand<De, Duration>;
