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

use bitvec::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::Path;

use crate::{CycleDriver, Signal};

pub const DEFAULT_TOP_MODULE: &str = "simmem";
const DEFAULT_VCD_HEADER: &str = "simmem differential testbench VCD";
const CYCLE_VAR: &str = "sim_cycles";

/// Width recorded for multi-bit signals.
const DATA_WIDTH: usize = 64;

/// Writes the signals of one device into a VCD file.
///
/// Changes made during a cycle are deferred and written under that cycle's
/// timestamp when the cycle ends; values equal to the last written one are
/// skipped. The first I/O error is logged and puts the writer in an error
/// state in which it ignores everything.
pub struct VcdWriter<W: io::Write> {
    writer: vcd::Writer<W>,
    is_error_state: bool,
    id_map: HashMap<Signal, (vcd::IdCode, usize)>,
    cycle_id: Option<vcd::IdCode>,
    last_value_map: HashMap<vcd::IdCode, u64>,
    deferred_changes: BTreeMap<Signal, u64>,
    timestamp: u64,
}

impl VcdWriter<io::BufWriter<fs::File>> {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = fs::File::create(path)?;
        log::debug!("VCD file: {}", path.display());
        Ok(Self::new(io::BufWriter::new(file)))
    }
}

impl<W: io::Write> VcdWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: vcd::Writer::new(writer),
            is_error_state: false,
            id_map: HashMap::new(),
            cycle_id: None,
            last_value_map: HashMap::new(),
            deferred_changes: BTreeMap::new(),
            timestamp: 0,
        }
    }

    fn vcd_error_handler(&mut self, err: io::Error) {
        if !self.is_error_state {
            self.is_error_state = true;
            log::error!("VCD writing failed with error {:?}", err)
        }
    }

    pub fn is_error_state(&self) -> bool {
        self.is_error_state
    }

    /// Declares `signals` inside one module scope.
    pub fn write_header(&mut self, module: &str, signals: &[(Signal, usize)]) {
        if self.is_error_state {
            return;
        }
        self._write_header(module, signals)
            .unwrap_or_else(|err| self.vcd_error_handler(err));
    }

    fn _write_header(&mut self, module: &str, signals: &[(Signal, usize)]) -> io::Result<()> {
        self.writer.comment(DEFAULT_VCD_HEADER)?;
        self.writer.date(chrono::Utc::now().to_string().as_str())?;
        self.writer.timescale(1, vcd::TimescaleUnit::NS)?;
        self.writer.add_module(module)?;
        self.cycle_id = Some(self.writer.add_var(
            vcd::VarType::Integer,
            DATA_WIDTH as u32,
            CYCLE_VAR,
            None,
        )?);
        for (signal, width) in signals {
            if self.id_map.contains_key(signal) {
                log::warn!("Signal {} was redefined for VCD dumps.", signal);
                continue;
            }
            let var_type = if *width == 1 {
                vcd::VarType::Wire
            } else {
                vcd::VarType::Reg
            };
            let id = self
                .writer
                .add_var(var_type, *width as u32, &signal.to_string(), None)?;
            self.id_map.insert(*signal, (id, *width));
        }
        self.writer.upscope()?;
        self.writer.enddefinitions()
    }

    /// Records `value` on `signal` for the current cycle.
    pub fn change(&mut self, signal: Signal, value: u64) {
        if !self.id_map.contains_key(&signal) {
            log::warn!("No such signal {} was defined for VCD dumps.", signal);
            return;
        }
        if cfg!(feature = "trace-echo-vcd-signal-changes") {
            log::trace!("VCD changing {} to {:#x}", signal, value);
        }
        self.deferred_changes.insert(signal, value);
    }

    /// Writes the current cycle and moves on to the next.
    pub fn end_cycle(&mut self) {
        if self.is_error_state {
            self.deferred_changes.clear();
            return;
        }
        self._end_cycle()
            .unwrap_or_else(|err| self.vcd_error_handler(err));
    }

    fn _end_cycle(&mut self) -> io::Result<()> {
        self.writer.timestamp(self.timestamp)?;
        if let Some(cycle_id) = self.cycle_id {
            self.record_change(cycle_id, DATA_WIDTH, self.timestamp)?;
        }
        let deferred_changes = std::mem::take(&mut self.deferred_changes);
        for (signal, value) in deferred_changes {
            if let Some((id, width)) = self.id_map.get(&signal).copied() {
                self.record_change(id, width, value)?;
            }
        }
        self.timestamp += 1;
        Ok(())
    }

    fn record_change(&mut self, id: vcd::IdCode, width: usize, value: u64) -> io::Result<()> {
        if self.last_value_map.get(&id) == Some(&value) {
            return Ok(());
        }
        let bits = &value.view_bits::<Lsb0>()[..width.min(DATA_WIDTH)];
        if width == 1 {
            self.writer.change_scalar(id, bits[0])?;
        } else {
            self.writer.change_vector(
                id,
                bits.iter()
                    .rev()
                    .map(|b| (*b).into())
                    .collect::<Vec<_>>()
                    .as_slice(),
            )?;
        }
        self.last_value_map.insert(id, value);
        Ok(())
    }

    /// Writes changes still pending from an unfinished cycle.
    pub fn finish(mut self) {
        if !self.deferred_changes.is_empty() {
            self.end_cycle();
        }
    }
}

/// A cycle driver that records everything asserted on and read from the
/// wrapped driver.
pub struct TracingDriver<D, W: io::Write> {
    driver: D,
    vcd: VcdWriter<W>,
}

impl<D: CycleDriver, W: io::Write> TracingDriver<D, W> {
    pub fn new(driver: D, mut vcd: VcdWriter<W>) -> Self {
        let signals: Vec<(Signal, usize)> = driver
            .signals()
            .into_iter()
            .map(|s| (s, if s.is_flag() { 1 } else { DATA_WIDTH }))
            .collect();
        vcd.write_header(DEFAULT_TOP_MODULE, &signals);
        Self { driver, vcd }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_driver(self) -> D {
        self.vcd.finish();
        self.driver
    }
}

impl<D: CycleDriver, W: io::Write> CycleDriver for TracingDriver<D, W> {
    fn signals(&self) -> Vec<Signal> {
        self.driver.signals()
    }

    fn reset(&mut self) {
        self.driver.reset();
    }

    fn assert_signal(&mut self, signal: Signal, value: u64) {
        self.vcd.change(signal, value);
        self.driver.assert_signal(signal, value);
    }

    fn read_signal(&mut self, signal: Signal) -> u64 {
        let value = self.driver.read_signal(signal);
        self.vcd.change(signal, value);
        value
    }

    fn advance_clock(&mut self) {
        self.driver.advance_clock();
        self.vcd.end_cycle();
    }

    fn is_idle(&self) -> bool {
        self.driver.is_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DelayBankModel;
    use crate::Port;
    use std::cell::RefCell;
    use std::io::Write as _;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn dump(cycles: &[(u64, u64)]) -> String {
        let buffer = SharedBuffer::default();
        let mut traced =
            TracingDriver::new(DelayBankModel::new(4), VcdWriter::new(buffer.clone()));
        for (valid, key) in cycles {
            traced.assert_signal(Signal::Valid(Port::Admission), *valid);
            traced.assert_signal(Signal::Data(Port::Admission), *key);
            traced.assert_signal(Signal::AdmitDelay, 3);
            traced.read_signal(Signal::Releasable);
            traced.advance_clock();
        }
        traced.into_driver();
        let bytes = buffer.0.borrow().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn declares_every_signal() {
        let text = dump(&[]);
        assert!(text.contains("$date"));
        assert!(text.contains("$scope module simmem $end"));
        for name in ["admission_valid", "admission_data", "admit_delay", "releasable"] {
            assert!(text.contains(name), "{} missing from {}", name, text);
        }
        assert!(text.contains("$enddefinitions"));
    }

    #[test]
    fn one_timestamp_per_cycle() {
        let text = dump(&[(1, 2), (0, 2), (0, 2)]);
        for t in ["#0", "#1", "#2"] {
            assert!(text.lines().any(|l| l == t), "{} missing from {}", t, text);
        }
        assert!(!text.lines().any(|l| l == "#3"));
    }

    #[test]
    fn unchanged_values_are_not_repeated() {
        let text = dump(&[(1, 2), (1, 2), (1, 2)]);
        let admit_delay_changes = text
            .lines()
            .filter(|l| l.starts_with('b') && l[1..].trim_start_matches('0').starts_with("11 "))
            .count();
        assert_eq!(admit_delay_changes, 1);
    }

    #[test]
    fn traced_driver_behaves_like_the_device() {
        let mut plain = DelayBankModel::new(4);
        let mut traced =
            TracingDriver::new(DelayBankModel::new(4), VcdWriter::new(SharedBuffer::default()));
        for driver in [&mut plain as &mut dyn CycleDriver, &mut traced] {
            driver.assert_signal(Signal::Valid(Port::Admission), 1);
            driver.assert_signal(Signal::Data(Port::Admission), 1);
            driver.assert_signal(Signal::AdmitDelay, 2);
            driver.advance_clock();
        }
        assert_eq!(
            plain.read_signal(Signal::Releasable),
            traced.read_signal(Signal::Releasable)
        );
        assert!(!traced.vcd.is_error_state());
    }
}
