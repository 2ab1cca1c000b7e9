//! The semantic line configuration and its composition rules.
//!
//! A [`LineConfig`] carries every tunable as an `Option`, where `None`
//! means "leave it as the kernel has it". A [`ConfigBank`] layers a base
//! configuration with per-offset overrides and translates the result to
//! either wire format.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::chip::AbiVersion;
use crate::errors::{Error, Result};
use crate::line::options::ConfigOption;
use crate::line::values::Value;
use crate::uapi::{self, LineBits, GPIO_LINES_MAX, GPIO_LINE_NUM_ATTRS_MAX};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drive {
    PushPull,
    OpenDrain,
    OpenSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    Disabled,
    PullUp,
    PullDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum EventClock {
    #[default]
    Monotonic,
    Realtime,
}

/// Configuration of a single line. `None` fields are inherited or left
/// as-is.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LineConfig {
    pub direction: Option<Direction>,
    pub active_low: Option<bool>,
    pub drive: Option<Drive>,
    pub bias: Option<Bias>,
    pub edge: Option<Edge>,
    pub debounce: Option<Duration>,
    pub event_clock: Option<EventClock>,
    /// Initial output value for this line, meaningful only when
    /// `direction` is output.
    pub value: Option<Value>,
}

impl LineConfig {
    /// Applies one non-structural option. `Output`, `Defaulted` and
    /// `Lines` carry positional or bank-wide meaning and are handled by
    /// [`ConfigBank::apply`].
    fn apply_simple(&mut self, opt: &ConfigOption) {
        match opt {
            ConfigOption::AsIs => self.direction = None,
            ConfigOption::Input => {
                self.direction = Some(Direction::Input);
                self.drive = None;
                self.value = None;
            }
            ConfigOption::ActiveLow => self.active_low = Some(true),
            ConfigOption::ActiveHigh => self.active_low = Some(false),
            // Drive options imply output, which rules out edges and
            // debounce.
            ConfigOption::OpenDrain => self.set_drive(Drive::OpenDrain),
            ConfigOption::OpenSource => self.set_drive(Drive::OpenSource),
            ConfigOption::PushPull => self.set_drive(Drive::PushPull),
            ConfigOption::BiasDisabled => self.bias = Some(Bias::Disabled),
            ConfigOption::BiasAsIs => self.bias = None,
            ConfigOption::PullUp => self.bias = Some(Bias::PullUp),
            ConfigOption::PullDown => self.bias = Some(Bias::PullDown),
            // Edge and debounce options imply input.
            ConfigOption::RisingEdge => self.set_edge(Edge::Rising),
            ConfigOption::FallingEdge => self.set_edge(Edge::Falling),
            ConfigOption::BothEdges => self.set_edge(Edge::Both),
            ConfigOption::NoEdges => self.edge = None,
            ConfigOption::Debounce(period) => {
                self.debounce = Some(*period);
                self.to_input();
            }
            ConfigOption::MonotonicEventClock => self.event_clock = Some(EventClock::Monotonic),
            ConfigOption::RealtimeEventClock => self.event_clock = Some(EventClock::Realtime),
            ConfigOption::Output(_) | ConfigOption::Defaulted | ConfigOption::Lines(..) => {
                unreachable!("structural option handled by ConfigBank")
            }
        }
    }

    fn set_edge(&mut self, edge: Edge) {
        self.edge = Some(edge);
        self.to_input();
    }

    fn to_input(&mut self) {
        self.direction = Some(Direction::Input);
        self.drive = None;
        self.value = None;
    }

    fn set_drive(&mut self, drive: Drive) {
        self.drive = Some(drive);
        self.to_output();
    }

    pub(crate) fn to_output(&mut self) {
        self.direction = Some(Direction::Output);
        self.edge = None;
        self.debounce = None;
    }

    pub(crate) fn v2_flags(&self) -> uapi::v2::LineFlags {
        use uapi::v2::LineFlags;

        let mut flags = LineFlags::empty();
        match self.direction {
            Some(Direction::Input) => flags |= LineFlags::INPUT,
            Some(Direction::Output) => flags |= LineFlags::OUTPUT,
            None => {}
        }
        if self.active_low == Some(true) {
            flags |= LineFlags::ACTIVE_LOW;
        }
        if self.direction == Some(Direction::Output) {
            match self.drive {
                Some(Drive::OpenDrain) => flags |= LineFlags::OPEN_DRAIN,
                Some(Drive::OpenSource) => flags |= LineFlags::OPEN_SOURCE,
                Some(Drive::PushPull) | None => {}
            }
        } else {
            match self.edge {
                Some(Edge::Rising) => flags |= LineFlags::EDGE_RISING,
                Some(Edge::Falling) => flags |= LineFlags::EDGE_FALLING,
                Some(Edge::Both) => flags |= LineFlags::EDGE_RISING | LineFlags::EDGE_FALLING,
                None => {}
            }
            if self.edge.is_some() && self.event_clock == Some(EventClock::Realtime) {
                flags |= LineFlags::EVENT_CLOCK_REALTIME;
            }
        }
        match self.bias {
            Some(Bias::PullUp) => flags |= LineFlags::BIAS_PULL_UP,
            Some(Bias::PullDown) => flags |= LineFlags::BIAS_PULL_DOWN,
            Some(Bias::Disabled) => flags |= LineFlags::BIAS_DISABLED,
            None => {}
        }
        flags
    }

    pub(crate) fn v1_handle_flags(&self) -> uapi::v1::HandleFlags {
        use uapi::v1::HandleFlags;

        let mut flags = HandleFlags::empty();
        match self.direction {
            Some(Direction::Input) => flags |= HandleFlags::INPUT,
            Some(Direction::Output) => flags |= HandleFlags::OUTPUT,
            None => {}
        }
        if self.active_low == Some(true) {
            flags |= HandleFlags::ACTIVE_LOW;
        }
        if self.direction == Some(Direction::Output) {
            match self.drive {
                Some(Drive::OpenDrain) => flags |= HandleFlags::OPEN_DRAIN,
                Some(Drive::OpenSource) => flags |= HandleFlags::OPEN_SOURCE,
                Some(Drive::PushPull) | None => {}
            }
        }
        match self.bias {
            Some(Bias::PullUp) => flags |= HandleFlags::BIAS_PULL_UP,
            Some(Bias::PullDown) => flags |= HandleFlags::BIAS_PULL_DOWN,
            Some(Bias::Disabled) => flags |= HandleFlags::BIAS_DISABLE,
            None => {}
        }
        flags
    }

    pub(crate) fn v1_event_flags(&self) -> uapi::v1::EventFlags {
        use uapi::v1::EventFlags;

        match self.edge {
            Some(Edge::Rising) => EventFlags::RISING_EDGE,
            Some(Edge::Falling) => EventFlags::FALLING_EDGE,
            Some(Edge::Both) => EventFlags::BOTH_EDGES,
            None => EventFlags::empty(),
        }
    }
}

/// The composed configuration of one request: a base applying to every
/// line plus per-offset overrides.
///
/// Options are folded in strictly in the order given. An offset gains an
/// override the first time a `Lines` subset names it; from then on
/// top-level options no longer reach it, until a `Defaulted` inside a
/// subset drops the override again.
#[derive(Debug, Clone)]
pub(crate) struct ConfigBank {
    offsets: heapless::Vec<u32, GPIO_LINES_MAX>,
    /// Chip-level defaults; what `Defaulted` reverts to.
    chip_base: LineConfig,
    base: LineConfig,
    /// Positional initial values for the base config, indexed like
    /// `offsets`.
    base_values: Vec<Option<Value>>,
    /// `None` marks a tombstone: the override was dropped and the line
    /// follows the base again.
    overrides: BTreeMap<u32, Option<LineConfig>>,
}

impl ConfigBank {
    pub(crate) fn new(offsets: &[u32], chip_options: &[ConfigOption]) -> Result<Self> {
        let offsets: heapless::Vec<u32, GPIO_LINES_MAX> = heapless::Vec::from_slice(offsets)
            .map_err(|_| {
                Error::invalid_config(format!(
                    "more than {GPIO_LINES_MAX} offsets in one request"
                ))
            })?;
        let mut bank = Self {
            base_values: vec![None; offsets.len()],
            offsets,
            chip_base: LineConfig::default(),
            base: LineConfig::default(),
            overrides: BTreeMap::new(),
        };
        for opt in chip_options {
            bank.apply(opt)?;
        }
        bank.chip_base = bank.base.clone();
        Ok(bank)
    }

    pub(crate) fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    fn index_of(&self, offset: u32) -> Option<usize> {
        self.offsets.iter().position(|o| *o == offset)
    }

    /// Applies one option, in order.
    pub(crate) fn apply(&mut self, opt: &ConfigOption) -> Result<()> {
        match opt {
            ConfigOption::Defaulted => {
                self.base = self.chip_base.clone();
                self.base_values.fill(None);
            }
            ConfigOption::Output(values) => {
                if values.len() > self.offsets.len() {
                    return Err(Error::invalid_config(format!(
                        "{} output values for {} requested lines",
                        values.len(),
                        self.offsets.len()
                    )));
                }
                self.base.to_output();
                for (slot, v) in self.base_values.iter_mut().zip(
                    values
                        .iter()
                        .copied()
                        .map(Some)
                        .chain(core::iter::repeat(None)),
                ) {
                    *slot = v;
                }
            }
            ConfigOption::Lines(subset, inner) => {
                // An empty subset targets every offset of the request.
                let all;
                let subset: &[u32] = if subset.is_empty() {
                    all = self.offsets.clone();
                    &all
                } else {
                    subset
                };
                for offset in subset {
                    if self.index_of(*offset).is_none() {
                        return Err(Error::invalid_config(format!(
                            "offset {offset} is not part of the request"
                        )));
                    }
                }
                for o in inner {
                    self.apply_to_subset(subset, o)?;
                }
            }
            simple => self.base.apply_simple(simple),
        }
        Ok(())
    }

    fn apply_to_subset(&mut self, subset: &[u32], opt: &ConfigOption) -> Result<()> {
        match opt {
            ConfigOption::Defaulted => {
                for offset in subset {
                    self.overrides.insert(*offset, None);
                }
                Ok(())
            }
            ConfigOption::Output(values) => {
                if values.len() > subset.len() {
                    return Err(Error::invalid_config(format!(
                        "{} output values for a {} line subset",
                        values.len(),
                        subset.len()
                    )));
                }
                for (i, offset) in subset.iter().enumerate() {
                    let cfg = self.override_mut(*offset);
                    cfg.to_output();
                    cfg.value = Some(values.get(i).copied().unwrap_or_default());
                }
                Ok(())
            }
            ConfigOption::Lines(..) => Err(Error::invalid_config(
                "subset overrides do not nest".to_string(),
            )),
            simple => {
                for offset in subset {
                    self.override_mut(*offset).apply_simple(simple);
                }
                Ok(())
            }
        }
    }

    /// The override for `offset`, created as a snapshot of the current
    /// base if the line has none (or only a tombstone).
    fn override_mut(&mut self, offset: u32) -> &mut LineConfig {
        let idx = self.index_of(offset).expect("offset validated");
        let entry = self.overrides.entry(offset).or_insert(None);
        if entry.is_none() {
            let mut cfg = self.base.clone();
            cfg.value = self.base_values[idx];
            *entry = Some(cfg);
        }
        entry.as_mut().expect("just populated")
    }

    /// The configuration in force for the line at request index `idx`.
    pub(crate) fn effective(&self, idx: usize) -> LineConfig {
        let offset = self.offsets[idx];
        if let Some(Some(cfg)) = self.overrides.get(&offset) {
            return cfg.clone();
        }
        let mut cfg = self.base.clone();
        cfg.value = self.base_values[idx];
        cfg
    }

    pub(crate) fn has_overrides(&self) -> bool {
        self.overrides.values().any(|o| o.is_some())
    }

    /// True if any line has edge detection configured.
    pub(crate) fn wants_edges(&self) -> bool {
        (0..self.offsets.len()).any(|i| self.effective(i).edge.is_some())
    }

    /// Checks the configuration invariants and the negotiated ABI's
    /// expressiveness, before any kernel call.
    pub(crate) fn validate(&self, abi: AbiVersion) -> Result<()> {
        for idx in 0..self.offsets.len() {
            let cfg = self.effective(idx);
            let offset = self.offsets[idx];
            if cfg.edge.is_some() && cfg.direction == Some(Direction::Output) {
                return Err(Error::invalid_config(format!(
                    "offset {offset}: edge detection requires input direction"
                )));
            }
            if matches!(cfg.drive, Some(Drive::OpenDrain | Drive::OpenSource))
                && cfg.direction != Some(Direction::Output)
            {
                return Err(Error::invalid_config(format!(
                    "offset {offset}: open drain and open source require output direction"
                )));
            }
            if cfg.debounce.is_some() && cfg.direction == Some(Direction::Output) {
                return Err(Error::invalid_config(format!(
                    "offset {offset}: debounce requires input direction"
                )));
            }
            if let Some(period) = cfg.debounce {
                if u32::try_from(period.as_micros()).is_err() {
                    return Err(Error::invalid_config(format!(
                        "offset {offset}: debounce period {period:?} exceeds the uAPI range"
                    )));
                }
            }
            if abi == AbiVersion::V1 {
                if cfg.debounce.is_some_and(|d| !d.is_zero()) {
                    return Err(Error::abi("debounce", abi));
                }
                if cfg.event_clock == Some(EventClock::Realtime) {
                    return Err(Error::abi("event clock", abi));
                }
            }
        }
        if abi == AbiVersion::V1 && self.has_overrides() {
            return Err(Error::abi("per-line configuration", abi));
        }
        Ok(())
    }

    /// Encodes the bank as a v2 line config: base flags plus attributes
    /// with per-line masks for the outliers.
    pub(crate) fn to_v2(&self) -> Result<uapi::v2::gpio_v2_line_config> {
        use uapi::v2::{gpio_v2_line_attribute, gpio_v2_line_config};

        let mut config = gpio_v2_line_config::zeroed();
        config.flags = self.base.v2_flags();

        // Flag outliers, grouped so lines sharing a flag set share one
        // attribute.
        let mut flag_groups: Vec<(uapi::v2::LineFlags, LineBits)> = Vec::new();
        // Debounce groups, one attribute per distinct period.
        let mut debounce_groups: Vec<(u32, LineBits)> = Vec::new();
        let mut out_values = LineBits::empty();
        let mut out_mask = LineBits::empty();

        for idx in 0..self.offsets.len() {
            let cfg = self.effective(idx);
            let flags = cfg.v2_flags();
            if flags != config.flags {
                match flag_groups.iter_mut().find(|(f, _)| *f == flags) {
                    Some((_, mask)) => mask.set(idx, true),
                    None => flag_groups.push((flags, LineBits::from_indices([idx]))),
                }
            }
            if let Some(period) = cfg.debounce {
                let us = period.as_micros() as u32;
                match debounce_groups.iter_mut().find(|(p, _)| *p == us) {
                    Some((_, mask)) => mask.set(idx, true),
                    None => debounce_groups.push((us, LineBits::from_indices([idx]))),
                }
            }
            if cfg.direction == Some(Direction::Output) {
                if let Some(value) = cfg.value {
                    out_mask.set(idx, true);
                    out_values.set(idx, value.is_active());
                }
            }
        }

        let mut attrs = Vec::new();
        for (flags, mask) in flag_groups {
            attrs.push((gpio_v2_line_attribute::flags(flags), mask));
        }
        if !out_mask.is_empty() {
            attrs.push((gpio_v2_line_attribute::output_values(out_values.0), out_mask));
        }
        for (us, mask) in debounce_groups {
            attrs.push((gpio_v2_line_attribute::debounce(us), mask));
        }

        if attrs.len() > GPIO_LINE_NUM_ATTRS_MAX {
            return Err(Error::invalid_config(format!(
                "configuration needs {} attributes, the uAPI caps at {}",
                attrs.len(),
                GPIO_LINE_NUM_ATTRS_MAX
            )));
        }
        config.num_attrs = attrs.len() as u32;
        for (slot, (attr, mask)) in config.attrs.iter_mut().zip(attrs) {
            slot.attr = attr;
            slot.mask = mask.0;
        }
        Ok(config)
    }

    /// Encodes the base as v1 handle flags plus default values. Only
    /// valid once `validate(AbiVersion::V1)` passed, so there are no
    /// overrides to lose.
    pub(crate) fn to_v1(&self) -> (uapi::v1::HandleFlags, [u8; GPIO_LINES_MAX]) {
        let flags = self.base.v1_handle_flags();
        let mut values = [0u8; GPIO_LINES_MAX];
        if self.base.direction == Some(Direction::Output) {
            for (slot, value) in values.iter_mut().zip(self.base_values.iter()) {
                *slot = value.unwrap_or_default().as_u8();
            }
        }
        (flags, values)
    }

    pub(crate) fn v1_event_flags(&self) -> uapi::v1::EventFlags {
        self.base.v1_event_flags()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::options::ConfigOption as O;
    use crate::uapi::v2::{LineAttr, LineFlags};

    fn bank(offsets: &[u32], chip: &[O], opts: &[O]) -> ConfigBank {
        let mut bank = ConfigBank::new(offsets, chip).unwrap();
        for o in opts {
            bank.apply(o).unwrap();
        }
        bank
    }

    fn attr_list(cfg: &uapi::v2::gpio_v2_line_config) -> Vec<(LineAttr, u64)> {
        cfg.attrs[..cfg.num_attrs as usize]
            .iter()
            .map(|a| (a.attr.decode().unwrap(), a.mask))
            .collect()
    }

    #[test]
    fn base_options_apply_in_order() {
        let b = bank(&[1, 2, 3], &[], &[O::ActiveLow, O::ActiveHigh, O::Input, O::PullUp]);
        let cfg = b.effective(0);
        assert_eq!(cfg.active_low, Some(false));
        assert_eq!(cfg.direction, Some(Direction::Input));
        assert_eq!(cfg.bias, Some(Bias::PullUp));
    }

    #[test]
    fn chip_defaults_inherited_and_overridden() {
        let b = bank(&[0], &[O::Input, O::PullDown], &[O::PullUp]);
        let cfg = b.effective(0);
        assert_eq!(cfg.direction, Some(Direction::Input));
        assert_eq!(cfg.bias, Some(Bias::PullUp));
    }

    #[test]
    fn defaulted_reverts_to_chip_defaults() {
        let b = bank(
            &[0, 1],
            &[O::PullDown],
            &[O::ActiveLow, O::PullUp, O::Defaulted, O::Input],
        );
        let cfg = b.effective(0);
        assert_eq!(cfg.active_low, None);
        assert_eq!(cfg.bias, Some(Bias::PullDown));
        assert_eq!(cfg.direction, Some(Direction::Input));
    }

    #[test]
    fn edges_imply_input() {
        let b = bank(&[4], &[], &[O::Output(vec![Value::Active]), O::BothEdges]);
        let cfg = b.effective(0);
        assert_eq!(cfg.direction, Some(Direction::Input));
        assert_eq!(cfg.edge, Some(Edge::Both));
        assert_eq!(cfg.value, None);
    }

    #[test]
    fn drive_implies_output() {
        let b = bank(&[4], &[], &[O::Input, O::OpenDrain]);
        let cfg = b.effective(0);
        assert_eq!(cfg.direction, Some(Direction::Output));
        assert_eq!(cfg.drive, Some(Drive::OpenDrain));
    }

    #[test]
    fn subset_override_in_and_out() {
        // Request [a..e] as pulled-down inputs, flip two of them to
        // active-low open-drain outputs.
        let ll = [10, 11, 12, 13, 14];
        let b = bank(
            &ll,
            &[],
            &[
                O::Input,
                O::PullDown,
                O::Lines(
                    vec![12, 14],
                    vec![
                        O::Output(vec![Value::Active, Value::Active]),
                        O::ActiveLow,
                        O::PullUp,
                        O::OpenDrain,
                    ],
                ),
            ],
        );
        let a = b.effective(0);
        assert_eq!(a.direction, Some(Direction::Input));
        assert_eq!(a.bias, Some(Bias::PullDown));
        let c = b.effective(2);
        assert_eq!(c.direction, Some(Direction::Output));
        assert_eq!(c.active_low, Some(true));
        assert_eq!(c.bias, Some(Bias::PullUp));
        assert_eq!(c.drive, Some(Drive::OpenDrain));
        assert_eq!(c.value, Some(Value::Active));
    }

    #[test]
    fn later_base_options_do_not_reach_overrides() {
        let ll = [0, 1, 2, 3, 4];
        let b = bank(
            &ll,
            &[],
            &[
                O::Input,
                O::Lines(
                    vec![2, 4],
                    vec![
                        O::Output(vec![Value::Active, Value::Active]),
                        O::ActiveLow,
                        O::PullUp,
                        O::OpenDrain,
                    ],
                ),
                O::Lines(vec![3, 4], vec![O::Debounce(Duration::from_micros(1432))]),
                O::PullDown,
            ],
        );
        // untouched line follows the base, including the late pull-down
        let l0 = b.effective(0);
        assert_eq!(l0.bias, Some(Bias::PullDown));
        assert_eq!(l0.direction, Some(Direction::Input));
        // overridden line keeps its snapshot
        let l2 = b.effective(2);
        assert_eq!(l2.bias, Some(Bias::PullUp));
        assert_eq!(l2.direction, Some(Direction::Output));
        // debounce-only override snapshots the base before the pull-down
        let l3 = b.effective(3);
        assert_eq!(l3.bias, None);
        assert_eq!(l3.debounce, Some(Duration::from_micros(1432)));
        assert_eq!(l3.direction, Some(Direction::Input));
        // debounce on top of the earlier output override flips it back
        // to input and drops the drive
        let l4 = b.effective(4);
        assert_eq!(l4.direction, Some(Direction::Input));
        assert_eq!(l4.drive, None);
        assert_eq!(l4.active_low, Some(true));
        assert_eq!(l4.bias, Some(Bias::PullUp));
        assert_eq!(l4.debounce, Some(Duration::from_micros(1432)));
    }

    #[test]
    fn subset_defaulted_drops_the_override() {
        let ll = [0, 1, 2, 3, 4];
        let b = bank(
            &ll,
            &[],
            &[
                O::Input,
                O::Lines(vec![2, 4], vec![O::Debounce(Duration::from_micros(1234))]),
                O::Lines(vec![2], vec![O::Defaulted]),
                O::ActiveLow,
            ],
        );
        // the dropped override follows the base again, late options
        // included
        let l2 = b.effective(2);
        assert_eq!(l2.debounce, None);
        assert_eq!(l2.active_low, Some(true));
        // the sibling override survives
        let l4 = b.effective(4);
        assert_eq!(l4.debounce, Some(Duration::from_micros(1234)));
        assert_eq!(l4.active_low, None);
    }

    #[test]
    fn empty_subset_targets_every_offset() {
        let ll = [0, 1, 2, 3, 4];
        let b = bank(
            &ll,
            &[],
            &[
                O::Input,
                O::Lines(vec![2, 4], vec![O::Debounce(Duration::from_micros(1234))]),
                O::Lines(vec![], vec![O::Defaulted]),
                O::ActiveLow,
            ],
        );
        for idx in [1, 2, 4] {
            let cfg = b.effective(idx);
            assert_eq!(cfg.debounce, None, "line {idx}");
            assert_eq!(cfg.active_low, Some(true), "line {idx}");
        }
    }

    #[test]
    fn output_values_pad_short_and_reject_long() {
        let b = bank(
            &[1, 2, 3],
            &[],
            &[O::Output(vec![Value::Active, Value::Inactive])],
        );
        assert_eq!(b.effective(0).value, Some(Value::Active));
        assert_eq!(b.effective(1).value, Some(Value::Inactive));
        // unspecified trailing values encode as inactive
        let (_, values) = b.to_v1();
        assert_eq!(&values[..3], &[1, 0, 0]);

        let mut bank = ConfigBank::new(&[1, 2], &[]).unwrap();
        let err = bank
            .apply(&O::Output(vec![Value::Active; 3]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn subset_output_values_are_positional_over_the_subset() {
        let ll = [5, 6, 7];
        let b = bank(
            &ll,
            &[],
            &[
                O::Input,
                O::Lines(vec![7], vec![O::Output(vec![Value::Active])]),
            ],
        );
        assert_eq!(b.effective(2).value, Some(Value::Active));
        assert_eq!(b.effective(0).value, None);
    }

    #[test]
    fn unknown_subset_offset_is_rejected() {
        let mut bank = ConfigBank::new(&[1, 2], &[]).unwrap();
        let err = bank
            .apply(&O::Lines(vec![9], vec![O::Input]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn v1_rejects_v2_only_features() {
        let b = bank(&[1], &[], &[O::Debounce(Duration::from_micros(10))]);
        match b.validate(AbiVersion::V1) {
            Err(Error::UapiIncompatibility {
                feature: "debounce",
                abi_version: AbiVersion::V1,
            }) => {}
            other => panic!("unexpected: {other:?}"),
        }
        assert!(b.validate(AbiVersion::V2).is_ok());

        let b = bank(&[1], &[], &[O::BothEdges, O::RealtimeEventClock]);
        assert!(matches!(
            b.validate(AbiVersion::V1),
            Err(Error::UapiIncompatibility {
                feature: "event clock",
                ..
            })
        ));

        let b = bank(&[1, 2], &[], &[O::Lines(vec![2], vec![O::ActiveLow])]);
        assert!(matches!(
            b.validate(AbiVersion::V1),
            Err(Error::UapiIncompatibility {
                feature: "per-line configuration",
                ..
            })
        ));
    }

    #[test]
    fn v2_encoding_groups_attributes() {
        let ll = [0, 1, 2, 3, 4];
        let b = bank(
            &ll,
            &[],
            &[
                O::Input,
                O::PullDown,
                O::Lines(
                    vec![2, 4],
                    vec![O::Output(vec![Value::Active, Value::Active]), O::PullUp],
                ),
            ],
        );
        b.validate(AbiVersion::V2).unwrap();
        let cfg = b.to_v2().unwrap();
        assert_eq!(
            cfg.flags,
            LineFlags::INPUT | LineFlags::BIAS_PULL_DOWN
        );
        let attrs = attr_list(&cfg);
        // lines 2 and 4 share one flags attribute, plus their output
        // values
        let expect_mask = (1 << 2) | (1 << 4);
        assert_eq!(
            attrs,
            vec![
                (
                    LineAttr::Flags(LineFlags::OUTPUT | LineFlags::BIAS_PULL_UP),
                    expect_mask
                ),
                (LineAttr::OutputValues(expect_mask), expect_mask),
            ]
        );
    }

    #[test]
    fn v2_encoding_distinct_debounce_periods() {
        let ll = [0, 1, 2];
        let b = bank(
            &ll,
            &[],
            &[
                O::Debounce(Duration::from_micros(1234)),
                O::Lines(vec![2], vec![O::Debounce(Duration::from_micros(1432))]),
            ],
        );
        let cfg = b.to_v2().unwrap();
        let attrs = attr_list(&cfg);
        assert!(attrs.contains(&(LineAttr::DebouncePeriodUs(1234), 0b011)));
        assert!(attrs.contains(&(LineAttr::DebouncePeriodUs(1432), 0b100)));
    }

    #[test]
    fn validation_rejects_conflicts() {
        // output + edges cannot be composed via options (edges force
        // input), so poke the config directly
        let mut b = bank(&[1], &[], &[O::BothEdges]);
        b.base.direction = Some(Direction::Output);
        assert!(matches!(
            b.validate(AbiVersion::V2),
            Err(Error::InvalidConfig(_))
        ));

        let mut b = bank(&[1], &[], &[O::Input]);
        b.base.drive = Some(Drive::OpenDrain);
        assert!(matches!(
            b.validate(AbiVersion::V2),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn v1_encoding() {
        let b = bank(
            &[1, 2],
            &[],
            &[
                O::Output(vec![Value::Active, Value::Inactive]),
                O::ActiveLow,
                O::OpenDrain,
            ],
        );
        b.validate(AbiVersion::V1).unwrap();
        let (flags, values) = b.to_v1();
        use uapi::v1::HandleFlags;
        assert_eq!(
            flags,
            HandleFlags::OUTPUT | HandleFlags::ACTIVE_LOW | HandleFlags::OPEN_DRAIN
        );
        assert_eq!(&values[..2], &[1, 0]);
    }

    #[test]
    fn realtime_clock_flag_needs_edges() {
        let b = bank(&[1], &[], &[O::RealtimeEventClock, O::Input]);
        let cfg = b.to_v2().unwrap();
        assert!(!cfg.flags.contains(LineFlags::EVENT_CLOCK_REALTIME));

        let b = bank(&[1], &[], &[O::BothEdges, O::RealtimeEventClock]);
        let cfg = b.to_v2().unwrap();
        assert!(cfg.flags.contains(LineFlags::EVENT_CLOCK_REALTIME));
    }
}
