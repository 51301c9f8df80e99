// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Context;
use fields::{AxiCodec, AxiDimensions};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::{Cycle, Error};

/// Masks of releasable keys are carried in a u64.
pub const MAX_KEY_CAPACITY: usize = 64;

/// Parameters of a verification run.
///
/// Constructed programmatically or read from a YAML file. Missing keys take
/// their default value.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct DvConfig {
    /// Bits needed to carry a key.
    pub key_width: usize,
    /// Number of distinct keys; a power of two.
    pub key_capacity: usize,
    /// Width of the randomly drawn burst lengths.
    pub burst_width: usize,
    pub min_delay: Cycle,
    pub max_delay: Cycle,
    /// Extra cycles the delay bank counts on top of the oracle delay.
    pub adjustment_delay: Cycle,
    /// Total slots of the response bank.
    pub reservation_capacity: usize,
    pub reset_cycles: Cycle,
    /// Drain phase once stimulus stops.
    pub trailing_cycles: Cycle,
    pub valid_probability: f64,
    pub ready_probability: f64,
    /// Per-key probability that the release enable bit is set.
    pub release_probability: f64,
    /// Write addresses the requester may issue while it still owes data
    /// for earlier ones.
    pub max_unsent_writes: usize,
    pub axi: AxiDimensions,
}

impl Default for DvConfig {
    fn default() -> Self {
        Self {
            key_width: 2,
            key_capacity: 4,
            burst_width: 3,
            min_delay: 3,
            max_delay: 10,
            adjustment_delay: 1,
            reservation_capacity: 16,
            reset_cycles: 5,
            trailing_cycles: 100,
            valid_probability: 0.5,
            ready_probability: 0.5,
            release_probability: 1.0,
            max_unsent_writes: 1,
            axi: AxiDimensions::default(),
        }
    }
}

impl DvConfig {
    /// The delay bank is exercised with 32 local identifiers.
    pub fn delay_bank() -> Self {
        Self::with_keys(5)
    }

    /// A configuration with `2^key_width` keys and a matching AXI id.
    pub fn with_keys(key_width: usize) -> Self {
        let mut config = Self {
            key_width,
            key_capacity: 1 << key_width,
            ..Default::default()
        };
        config.axi.id_width = key_width;
        config
    }

    pub fn from_file(file_name: &Path) -> anyhow::Result<Self> {
        let file = File::open(file_name)
            .with_context(|| format!("Could not open config file {:?}", file_name))?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)
            .with_context(|| format!("Could not parse config file {:?}", file_name))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_str(config: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |why: String| Err(Error::InvalidConfig(why));
        if !self.key_capacity.is_power_of_two() {
            return invalid(format!(
                "key capacity {} is not a power of two",
                self.key_capacity
            ));
        }
        if self.key_capacity > MAX_KEY_CAPACITY {
            return invalid(format!(
                "key capacity {} exceeds {}",
                self.key_capacity, MAX_KEY_CAPACITY
            ));
        }
        if self.key_width >= usize::BITS as usize || self.key_capacity > 1 << self.key_width {
            return invalid(format!(
                "{} keys do not fit in {} bits",
                self.key_capacity, self.key_width
            ));
        }
        if self.key_width != self.axi.id_width {
            return invalid(format!(
                "key width {} differs from AXI id width {}",
                self.key_width, self.axi.id_width
            ));
        }
        if self.burst_width > self.axi.burst_len_width {
            return invalid(format!(
                "burst width {} exceeds the burst length field ({})",
                self.burst_width, self.axi.burst_len_width
            ));
        }
        if self.min_delay == 0 || self.min_delay > self.max_delay {
            return invalid(format!(
                "delay range {}..={} is empty or starts at zero",
                self.min_delay, self.max_delay
            ));
        }
        if self.reservation_capacity == 0 {
            return invalid("reservation capacity is zero".to_string());
        }
        if self.max_unsent_writes == 0 {
            return invalid("no write address may ever be issued".to_string());
        }
        for (name, p) in [
            ("valid", self.valid_probability),
            ("ready", self.ready_probability),
            ("release", self.release_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return invalid(format!("{} probability {} outside [0, 1]", name, p));
            }
        }
        AxiCodec::new(self.axi)?;
        Ok(())
    }

    /// Codec for the configured AXI dimensions.
    pub fn codec(&self) -> Result<AxiCodec, Error> {
        Ok(AxiCodec::new(self.axi)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(DvConfig::default().validate(), Ok(()));
        let bank = DvConfig::delay_bank();
        assert_eq!(bank.key_capacity, 32);
        assert_eq!(bank.axi.id_width, 5);
        assert_eq!(bank.validate(), Ok(()));
    }

    #[test]
    fn read_yaml_config() {
        let conf_str = "---
key_width: 4
key_capacity: 16
min_delay: 2
max_delay: 6
axi:
  id_width: 4
  data_width: 16
  strb_width: 2
";
        let config = DvConfig::from_str(conf_str).unwrap();
        assert_eq!(config.key_capacity, 16);
        assert_eq!(config.min_delay, 2);
        assert_eq!(config.max_delay, 6);
        assert_eq!(config.axi.id_width, 4);
        assert_eq!(config.axi.data_width, 16);
        assert_eq!(config.axi.addr_width, 19);
        assert_eq!(config.trailing_cycles, 100);
    }

    #[test]
    fn write_yaml_config() {
        let config = DvConfig::delay_bank();
        let text = serde_yaml::to_string(&config).unwrap();
        assert_eq!(DvConfig::from_str(&text).unwrap(), config);
    }

    #[test]
    fn rejects_bad_configs() {
        let bad = [
            DvConfig {
                key_capacity: 3,
                ..Default::default()
            },
            DvConfig {
                key_capacity: 8,
                ..Default::default()
            },
            DvConfig {
                min_delay: 0,
                ..Default::default()
            },
            DvConfig {
                min_delay: 11,
                ..Default::default()
            },
            DvConfig {
                key_width: 3,
                key_capacity: 8,
                ..Default::default()
            },
            DvConfig {
                ready_probability: 1.5,
                ..Default::default()
            },
            DvConfig {
                burst_width: 9,
                ..Default::default()
            },
            DvConfig {
                max_unsent_writes: 0,
                ..Default::default()
            },
        ];
        for config in bad.iter() {
            assert!(
                matches!(config.validate(), Err(Error::InvalidConfig(_))),
                "{:?}",
                config
            );
        }
        assert!(DvConfig::with_keys(7).validate().is_err());
        let mut overflow = DvConfig::default();
        overflow.axi.addr_width = 60;
        assert!(matches!(
            overflow.validate(),
            Err(Error::InvalidLayout(_))
        ));
    }

    #[test]
    fn huge_yaml_width_is_rejected() {
        let conf_str = "---
axi:
  addr_width: 18446744073709551615
";
        assert!(DvConfig::from_str(conf_str).is_err());
        let mut config = DvConfig::default();
        config.axi.addr_width = usize::MAX;
        assert!(matches!(config.validate(), Err(Error::InvalidLayout(_))));
        assert!(config.codec().is_err());
    }
}
