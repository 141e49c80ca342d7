//! Optimizer configuration model.
//!
//! Every edit goes through [`normalize`], which never fails: non-numeric or non-finite
//! input falls back to the field default and everything else is clamped into bounds.
//! `RunConfig` fields are private so a config can only be built from the default record
//! plus normalized edits.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Bumped whenever the default record below changes.
pub const DEFAULTS_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    MinCvar,
    /// Uses `lambda`. With `MinCvar` the service ignores it.
    MeanMinusLambdaCvar,
}

impl Objective {
    pub fn as_str(self) -> &'static str {
        match self {
            Objective::MinCvar => "min_cvar",
            Objective::MeanMinusLambdaCvar => "mean_minus_lambda_cvar",
        }
    }

    /// Unknown names fall back to the default objective.
    pub fn parse_lossy(raw: &str) -> Self {
        match raw.trim() {
            "mean_minus_lambda_cvar" => Objective::MeanMinusLambdaCvar,
            _ => Objective::MinCvar,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericField {
    LookbackDays,
    TrainRatio,
    Alpha,
    Lambda,
    WMax,
    TurnoverMax,
    TransactionCostBps,
    Iters,
    StepSize,
    InitTemp,
    FinalTemp,
    Seed,
    PenaltyTurnover,
    PenaltyInvalid,
}

struct Bound {
    min: f64,
    max: f64,
    fallback: f64,
    integer: bool,
}

const fn bound(min: f64, max: f64, fallback: f64) -> Bound {
    Bound {
        min,
        max,
        fallback,
        integer: false,
    }
}

const fn int_bound(min: f64, max: f64, fallback: f64) -> Bound {
    Bound {
        min,
        max,
        fallback,
        integer: true,
    }
}

const UNBOUNDED: f64 = f64::INFINITY;
const PENALTY_INVALID: f64 = 1_000_000.0;

impl NumericField {
    pub const ALL: [NumericField; 14] = [
        NumericField::LookbackDays,
        NumericField::TrainRatio,
        NumericField::Alpha,
        NumericField::Lambda,
        NumericField::WMax,
        NumericField::TurnoverMax,
        NumericField::TransactionCostBps,
        NumericField::Iters,
        NumericField::StepSize,
        NumericField::InitTemp,
        NumericField::FinalTemp,
        NumericField::Seed,
        NumericField::PenaltyTurnover,
        NumericField::PenaltyInvalid,
    ];

    pub fn name(self) -> &'static str {
        match self {
            NumericField::LookbackDays => "lookback_days",
            NumericField::TrainRatio => "train_ratio",
            NumericField::Alpha => "alpha",
            NumericField::Lambda => "lambda",
            NumericField::WMax => "w_max",
            NumericField::TurnoverMax => "turnover_max",
            NumericField::TransactionCostBps => "transaction_cost_bps",
            NumericField::Iters => "iters",
            NumericField::StepSize => "step_size",
            NumericField::InitTemp => "init_temp",
            NumericField::FinalTemp => "final_temp",
            NumericField::Seed => "seed",
            NumericField::PenaltyTurnover => "penalty_turnover",
            NumericField::PenaltyInvalid => "penalty_invalid",
        }
    }

    fn bound(self) -> Bound {
        match self {
            NumericField::LookbackDays => int_bound(50.0, UNBOUNDED, 504.0),
            NumericField::TrainRatio => bound(0.5, 0.9, 0.7),
            NumericField::Alpha => bound(0.01, 0.2, 0.05),
            NumericField::Lambda => bound(0.0, UNBOUNDED, 0.5),
            NumericField::WMax => bound(0.05, 1.0, 0.6),
            NumericField::TurnoverMax => bound(0.0, 2.0, 0.5),
            NumericField::TransactionCostBps => bound(0.0, UNBOUNDED, 10.0),
            NumericField::Iters => int_bound(200.0, 20_000.0, 4000.0),
            NumericField::StepSize => bound(0.001, 0.5, 0.05),
            NumericField::InitTemp => bound(0.001, UNBOUNDED, 1.0),
            NumericField::FinalTemp => bound(0.000_001, UNBOUNDED, 0.001),
            NumericField::Seed => int_bound(-UNBOUNDED, UNBOUNDED, 42.0),
            NumericField::PenaltyTurnover => bound(0.0, UNBOUNDED, 50.0),
            NumericField::PenaltyInvalid => bound(PENALTY_INVALID, PENALTY_INVALID, PENALTY_INVALID),
        }
    }
}

/// Any editable field, numeric or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Objective,
    Numeric(NumericField),
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Objective => "objective",
            Field::Numeric(f) => f.name(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "objective" {
            return Ok(Field::Objective);
        }
        NumericField::ALL
            .iter()
            .copied()
            .find(|f| f.name() == s)
            .map(Field::Numeric)
            .ok_or_else(|| anyhow::anyhow!("unknown config field `{s}`"))
    }
}

/// Unparsed user input for a field.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    fn to_number(&self) -> f64 {
        match self {
            RawValue::Number(n) => *n,
            RawValue::Text(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        }
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Number(v)
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Number(v as f64)
    }
}

impl From<i32> for RawValue {
    fn from(v: i32) -> Self {
        RawValue::Number(f64::from(v))
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        RawValue::Text(v)
    }
}

/// Coerce raw input into a finite, in-bound value for `field`.
pub fn normalize(field: NumericField, raw: impl Into<RawValue>) -> f64 {
    let b = field.bound();
    let x = raw.into().to_number();
    if !x.is_finite() {
        return b.fallback;
    }
    let clamped = x.clamp(b.min, b.max);
    if b.integer {
        clamped.floor()
    } else {
        clamped
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunConfig {
    lookback_days: i64,
    train_ratio: f64,
    alpha: f64,
    objective: Objective,
    lambda: f64,
    w_max: f64,
    turnover_max: f64,
    transaction_cost_bps: f64,
    iters: i64,
    step_size: f64,
    init_temp: f64,
    final_temp: f64,
    seed: i64,
    penalty_turnover: f64,
    penalty_invalid: f64,
}

const DEFAULT_CONFIG: RunConfig = RunConfig {
    lookback_days: 504,
    train_ratio: 0.7,
    alpha: 0.05,
    objective: Objective::MinCvar,
    lambda: 0.5,
    w_max: 0.6,
    turnover_max: 0.5,
    transaction_cost_bps: 10.0,
    iters: 4000,
    step_size: 0.05,
    init_temp: 1.0,
    final_temp: 0.001,
    seed: 42,
    penalty_turnover: 50.0,
    penalty_invalid: PENALTY_INVALID,
};

/// The canonical default set.
pub fn reset() -> RunConfig {
    DEFAULT_CONFIG
}

/// Default record tagged with its version, as printed by `--print-defaults`.
#[derive(Debug, Clone, Serialize)]
pub struct DefaultsRecord {
    pub version: u32,
    pub config: RunConfig,
}

pub fn defaults_record() -> DefaultsRecord {
    DefaultsRecord {
        version: DEFAULTS_VERSION,
        config: reset(),
    }
}

impl RunConfig {
    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn value(&self, field: NumericField) -> f64 {
        match field {
            NumericField::LookbackDays => self.lookback_days as f64,
            NumericField::TrainRatio => self.train_ratio,
            NumericField::Alpha => self.alpha,
            NumericField::Lambda => self.lambda,
            NumericField::WMax => self.w_max,
            NumericField::TurnoverMax => self.turnover_max,
            NumericField::TransactionCostBps => self.transaction_cost_bps,
            NumericField::Iters => self.iters as f64,
            NumericField::StepSize => self.step_size,
            NumericField::InitTemp => self.init_temp,
            NumericField::FinalTemp => self.final_temp,
            NumericField::Seed => self.seed as f64,
            NumericField::PenaltyTurnover => self.penalty_turnover,
            NumericField::PenaltyInvalid => self.penalty_invalid,
        }
    }

    // Callers pass values that already went through `normalize`.
    fn store(&mut self, field: NumericField, v: f64) {
        match field {
            NumericField::LookbackDays => self.lookback_days = v as i64,
            NumericField::TrainRatio => self.train_ratio = v,
            NumericField::Alpha => self.alpha = v,
            NumericField::Lambda => self.lambda = v,
            NumericField::WMax => self.w_max = v,
            NumericField::TurnoverMax => self.turnover_max = v,
            NumericField::TransactionCostBps => self.transaction_cost_bps = v,
            NumericField::Iters => self.iters = v as i64,
            NumericField::StepSize => self.step_size = v,
            NumericField::InitTemp => self.init_temp = v,
            NumericField::FinalTemp => self.final_temp = v,
            NumericField::Seed => self.seed = v as i64,
            NumericField::PenaltyTurnover => self.penalty_turnover = v,
            NumericField::PenaltyInvalid => self.penalty_invalid = v,
        }
    }

    /// JSON document sent as the `config` part of a submission.
    pub fn to_document(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        reset()
    }
}

/// Long-lived, user-editable configuration. Frozen into a `RunConfig` at submission.
#[derive(Debug, Clone, Default)]
pub struct ConfigModel {
    current: RunConfig,
}

impl ConfigModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> &RunConfig {
        &self.current
    }

    pub fn set(&mut self, field: Field, raw: impl Into<RawValue>) {
        let raw = raw.into();
        match field {
            Field::Objective => {
                self.current.objective = match &raw {
                    RawValue::Text(s) => Objective::parse_lossy(s),
                    RawValue::Number(_) => Objective::default(),
                };
            }
            Field::Numeric(f) => {
                let v = normalize(f, raw);
                self.current.store(f, v);
            }
        }
    }

    /// Apply a `name=value` edit as given on the command line.
    pub fn apply_assignment(&mut self, assignment: &str) -> Result<()> {
        let Some((name, value)) = assignment.split_once('=') else {
            bail!("expected FIELD=VALUE, got `{assignment}`");
        };
        let field: Field = name.parse()?;
        self.set(field, value);
        Ok(())
    }

    /// Apply every entry of a params file, in key order.
    pub fn apply_params(&mut self, params: Vec<(String, RawValue)>) -> Result<()> {
        for (name, raw) in params {
            let field: Field = name.parse()?;
            self.set(field, raw);
        }
        Ok(())
    }

    pub fn reset(&mut self) -> RunConfig {
        self.current = reset();
        self.current.clone()
    }

    /// Copy of the current configuration for one submission.
    pub fn freeze(&self) -> RunConfig {
        self.current.clone()
    }
}

/// Read a flat `field = value` table from a TOML or JSON (by extension) file.
pub fn load_params(path: &Path) -> Result<Vec<(String, RawValue)>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read params file {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        let doc: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&text).context("parse params JSON")?;
        Ok(doc
            .into_iter()
            .map(|(k, v)| {
                let raw = match v {
                    serde_json::Value::Number(n) => RawValue::Number(n.as_f64().unwrap_or(f64::NAN)),
                    serde_json::Value::String(s) => RawValue::Text(s),
                    other => RawValue::Text(other.to_string()),
                };
                (k, raw)
            })
            .collect())
    } else {
        let doc: toml::Table = toml::from_str(&text).context("parse params TOML")?;
        Ok(doc
            .into_iter()
            .map(|(k, v)| {
                let raw = match v {
                    toml::Value::Integer(i) => RawValue::from(i),
                    toml::Value::Float(f) => RawValue::Number(f),
                    toml::Value::String(s) => RawValue::Text(s),
                    other => RawValue::Text(other.to_string()),
                };
                (k, raw)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalize_documented_examples() {
        assert_eq!(normalize(NumericField::LookbackDays, -5), 50.0);
        assert_eq!(normalize(NumericField::LookbackDays, "abc"), 504.0);
        assert_eq!(normalize(NumericField::Alpha, 10), 0.2);
        assert_eq!(normalize(NumericField::WMax, 0), 0.05);
    }

    #[test]
    fn non_finite_input_uses_fallback() {
        assert_eq!(normalize(NumericField::Alpha, f64::INFINITY), 0.05);
        assert_eq!(normalize(NumericField::Iters, f64::NEG_INFINITY), 4000.0);
        assert_eq!(normalize(NumericField::StepSize, f64::NAN), 0.05);
        assert_eq!(normalize(NumericField::Seed, ""), 42.0);
    }

    #[test]
    fn integer_fields_are_floored() {
        assert_eq!(normalize(NumericField::Iters, 1234.9), 1234.0);
        assert_eq!(normalize(NumericField::LookbackDays, "252.7"), 252.0);
        assert_eq!(normalize(NumericField::Seed, -3.5), -4.0);
        assert_eq!(normalize(NumericField::Iters, 99_999), 20_000.0);
    }

    #[test]
    fn penalty_invalid_is_fixed() {
        assert_eq!(normalize(NumericField::PenaltyInvalid, 3.0), 1_000_000.0);
        assert_eq!(normalize(NumericField::PenaltyInvalid, "x"), 1_000_000.0);
    }

    #[test]
    fn reset_returns_default_table_every_time() {
        let a = reset();
        let b = reset();
        assert_eq!(a, b);
        assert_eq!(a.value(NumericField::LookbackDays), 504.0);
        assert_eq!(a.value(NumericField::TrainRatio), 0.7);
        assert_eq!(a.objective(), Objective::MinCvar);
        assert_eq!(a.value(NumericField::Lambda), 0.5);
        assert_eq!(a.value(NumericField::WMax), 0.6);
        assert_eq!(a.value(NumericField::TurnoverMax), 0.5);
        assert_eq!(a.value(NumericField::TransactionCostBps), 10.0);
        assert_eq!(a.value(NumericField::Iters), 4000.0);
        assert_eq!(a.value(NumericField::StepSize), 0.05);
        assert_eq!(a.value(NumericField::InitTemp), 1.0);
        assert_eq!(a.value(NumericField::FinalTemp), 0.001);
        assert_eq!(a.value(NumericField::Seed), 42.0);
        assert_eq!(a.value(NumericField::PenaltyTurnover), 50.0);
        assert_eq!(a.value(NumericField::PenaltyInvalid), 1_000_000.0);
    }

    #[test]
    fn defaults_match_field_fallbacks() {
        let d = reset();
        for f in NumericField::ALL {
            assert_eq!(d.value(f), f.bound().fallback, "{}", f.name());
        }
    }

    #[test]
    fn model_reset_discards_edits() {
        let mut model = ConfigModel::new();
        model.set(Field::Numeric(NumericField::Alpha), 0.1);
        model.set(Field::Objective, "mean_minus_lambda_cvar");
        assert_eq!(model.config().value(NumericField::Alpha), 0.1);
        assert_eq!(model.reset(), reset());
        assert_eq!(model.config(), &reset());
    }

    #[test]
    fn unknown_objective_falls_back() {
        let mut model = ConfigModel::new();
        model.set(Field::Objective, "mean_minus_lambda_cvar");
        assert_eq!(model.config().objective(), Objective::MeanMinusLambdaCvar);
        model.set(Field::Objective, "max_sharpe");
        assert_eq!(model.config().objective(), Objective::MinCvar);
        model.set(Field::Objective, 3.0);
        assert_eq!(model.config().objective(), Objective::MinCvar);
    }

    #[test]
    fn lambda_stays_editable_under_min_cvar() {
        let mut model = ConfigModel::new();
        model.apply_assignment("lambda=2.5").unwrap();
        assert_eq!(model.config().objective(), Objective::MinCvar);
        assert_eq!(model.config().value(NumericField::Lambda), 2.5);
    }

    #[test]
    fn assignment_rejects_unknown_field_names() {
        let mut model = ConfigModel::new();
        assert!(model.apply_assignment("gamma=1").is_err());
        assert!(model.apply_assignment("alpha").is_err());
        model.apply_assignment(" alpha =0.5").unwrap();
        assert_eq!(model.config().value(NumericField::Alpha), 0.2);
    }

    #[test]
    fn document_uses_wire_field_names() {
        let doc: serde_json::Value =
            serde_json::from_str(&reset().to_document().unwrap()).unwrap();
        assert_eq!(doc["lookback_days"], 504);
        assert_eq!(doc["objective"], "min_cvar");
        assert_eq!(doc["iters"], 4000);
        assert_eq!(doc["seed"], 42);
        assert_eq!(doc["penalty_invalid"], 1_000_000.0);
        assert_eq!(doc.as_object().unwrap().len(), 15);
    }

    #[test]
    fn params_file_toml_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.toml");
        std::fs::write(
            &path,
            "alpha = 0.5\niters = 1000\nobjective = \"mean_minus_lambda_cvar\"\nseed = \"7\"\n",
        )
        .unwrap();

        let mut model = ConfigModel::new();
        model.apply_params(load_params(&path).unwrap()).unwrap();
        let cfg = model.freeze();
        assert_eq!(cfg.value(NumericField::Alpha), 0.2);
        assert_eq!(cfg.value(NumericField::Iters), 1000.0);
        assert_eq!(cfg.value(NumericField::Seed), 7.0);
        assert_eq!(cfg.objective(), Objective::MeanMinusLambdaCvar);
    }

    #[test]
    fn params_file_json_with_bad_values_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, r#"{"w_max": "lots", "train_ratio": 0.2, "lambda": true}"#).unwrap();

        let mut model = ConfigModel::new();
        model.apply_params(load_params(&path).unwrap()).unwrap();
        let cfg = model.freeze();
        assert_eq!(cfg.value(NumericField::WMax), 0.6);
        assert_eq!(cfg.value(NumericField::TrainRatio), 0.5);
        assert_eq!(cfg.value(NumericField::Lambda), 0.5);
    }

    fn any_raw() -> impl Strategy<Value = RawValue> {
        prop_oneof![
            any::<f64>().prop_map(RawValue::Number),
            Just(RawValue::Number(f64::INFINITY)),
            Just(RawValue::Number(f64::NEG_INFINITY)),
            (-1e7f64..1e7).prop_map(RawValue::Number),
            ".*".prop_map(RawValue::Text),
        ]
    }

    proptest! {
        #[test]
        fn normalize_always_within_bounds(idx in 0usize..NumericField::ALL.len(), raw in any_raw()) {
            let field = NumericField::ALL[idx];
            let b = field.bound();
            let v = normalize(field, raw);
            prop_assert!(v.is_finite());
            prop_assert!(v >= b.min && v <= b.max);
            if b.integer {
                prop_assert_eq!(v, v.floor());
            }
        }
    }
}
