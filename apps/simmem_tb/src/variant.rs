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

use std::str::FromStr;

use simmem_dv::models::{DelayBankModel, FaultProperties, ResponseBankModel, SimmemTopModel};
use simmem_dv::{
    response_bank_payload_width, CycleDriver, DelayBankBench, DvConfig, Error, ResponseBankBench,
    Testbench, TopBench,
};

// The device shape a run verifies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Variant {
    DelayBank,
    ResponseBank,
    Top,
}

impl FromStr for Variant {
    type Err = std::io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delay_bank" => Ok(Variant::DelayBank),
            "response_bank" => Ok(Variant::ResponseBank),
            "top" => Ok(Variant::Top),
            _ => Err(Self::Err::new(
                std::io::ErrorKind::Other,
                format!("Invalid testbench variant: {}", s),
            )),
        }
    }
}

impl Variant {
    /// Configuration used when none is given on the command line.
    pub fn default_config(&self) -> DvConfig {
        match self {
            Variant::DelayBank => DvConfig::delay_bank(),
            Variant::ResponseBank | Variant::Top => DvConfig::default(),
        }
    }

    /// The behavioral model of this variant's device.
    pub fn model(
        &self,
        config: &DvConfig,
        faults: FaultProperties,
    ) -> Result<Box<dyn CycleDriver>, Error> {
        let model: Box<dyn CycleDriver> = match self {
            Variant::DelayBank => {
                Box::new(DelayBankModel::with_faults(config.key_capacity, faults))
            }
            Variant::ResponseBank => Box::new(ResponseBankModel::with_faults(
                config.key_width,
                response_bank_payload_width(config),
                config.reservation_capacity,
                faults,
            )),
            Variant::Top => Box::new(SimmemTopModel::with_faults(
                config.codec()?,
                config.min_delay..=config.max_delay,
                faults,
            )),
        };
        Ok(model)
    }

    pub fn bench(
        &self,
        config: DvConfig,
        driver: Box<dyn CycleDriver>,
    ) -> Result<Box<dyn Testbench>, Error> {
        let bench: Box<dyn Testbench> = match self {
            Variant::DelayBank => Box::new(DelayBankBench::new(config, driver)?),
            Variant::ResponseBank => Box::new(ResponseBankBench::new(config, driver)?),
            Variant::Top => Box::new(TopBench::new(config, driver)?),
        };
        Ok(bench)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_variants() {
        assert_eq!("top".parse::<Variant>().unwrap(), Variant::Top);
        assert_eq!(
            "delay_bank".parse::<Variant>().unwrap(),
            Variant::DelayBank
        );
        assert!("Top".parse::<Variant>().is_err());
    }

    #[test]
    fn every_variant_runs_clean() {
        for variant in [Variant::DelayBank, Variant::ResponseBank, Variant::Top] {
            let config = variant.default_config();
            let model = variant.model(&config, FaultProperties::default()).unwrap();
            let mut bench = variant.bench(config, model).unwrap();
            assert!(bench.run(1, 200).unwrap().is_clean());
        }
    }
}
