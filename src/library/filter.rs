use std::fmt;
use std::str::FromStr;

use crate::library::catalog::Catalog;
use crate::library::record::{SampleRecord, NUM_KEYS};

const FLOAT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOperator {
    LessThan,
    EqualTo,
    GreaterThan,
    Contains,
}

impl CompareOperator {
    pub fn symbol(self) -> char {
        match self {
            CompareOperator::LessThan => '<',
            CompareOperator::EqualTo => '=',
            CompareOperator::GreaterThan => '>',
            CompareOperator::Contains => '~',
        }
    }

    fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '<' => Some(CompareOperator::LessThan),
            '=' => Some(CompareOperator::EqualTo),
            '>' => Some(CompareOperator::GreaterThan),
            '~' => Some(CompareOperator::Contains),
            _ => None,
        }
    }

    fn compare_f64(self, value: f64, operand: f64) -> bool {
        match self {
            CompareOperator::LessThan => value < operand,
            CompareOperator::EqualTo => (value - operand).abs() < FLOAT_TOLERANCE,
            CompareOperator::GreaterThan => value > operand,
            CompareOperator::Contains => false,
        }
    }

    fn compare_ord<T: Ord>(self, value: T, operand: T) -> bool {
        match self {
            CompareOperator::LessThan => value < operand,
            CompareOperator::EqualTo => value == operand,
            CompareOperator::GreaterThan => value > operand,
            CompareOperator::Contains => false,
        }
    }
}

/// The property a rule inspects, carrying its comparison operand.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    Length(f64),
    LoudnessDecibel(f64),
    LoudnessLufs(f64),
    Tempo(u32),
    Key(u8),
    Title(String),
}

impl RuleKind {
    /// Rules on computed descriptors never match unanalyzed records.
    pub fn requires_analysis(&self) -> bool {
        !matches!(self, RuleKind::Title(_))
    }

    fn field_name(&self) -> &'static str {
        match self {
            RuleKind::Length(_) => "length",
            RuleKind::LoudnessDecibel(_) => "db",
            RuleKind::LoudnessLufs(_) => "lufs",
            RuleKind::Tempo(_) => "tempo",
            RuleKind::Key(_) => "key",
            RuleKind::Title(_) => "title",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterRule {
    pub active: bool,
    pub operator: CompareOperator,
    pub kind: RuleKind,
}

impl FilterRule {
    pub fn new(kind: RuleKind, operator: CompareOperator) -> Self {
        Self {
            active: true,
            operator,
            kind,
        }
    }

    pub fn matches(&self, record: &SampleRecord) -> bool {
        if self.kind.requires_analysis() && !record.is_analyzed() {
            return false;
        }

        let op = self.operator;
        match &self.kind {
            RuleKind::Length(operand) => op.compare_f64(record.length(), *operand),
            RuleKind::LoudnessDecibel(operand) => op.compare_f64(record.loudness_db(), *operand),
            RuleKind::LoudnessLufs(operand) => op.compare_f64(record.loudness_lufs(), *operand),
            RuleKind::Tempo(operand) => record
                .tempo()
                .map_or(false, |tempo| op.compare_ord(tempo, *operand)),
            RuleKind::Key(operand) => record
                .key()
                .map_or(false, |key| op.compare_ord(key, *operand)),
            RuleKind::Title(operand) => {
                let title = record.title().to_lowercase();
                let operand = operand.to_lowercase();
                match op {
                    CompareOperator::Contains => title.contains(&operand),
                    CompareOperator::EqualTo => title == operand,
                    CompareOperator::LessThan | CompareOperator::GreaterThan => false,
                }
            }
        }
    }
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.field_name(), self.operator.symbol())?;
        match &self.kind {
            RuleKind::Length(v) | RuleKind::LoudnessDecibel(v) | RuleKind::LoudnessLufs(v) => {
                write!(f, "{}", v)
            }
            RuleKind::Tempo(v) => write!(f, "{}", v),
            RuleKind::Key(v) => write!(f, "{}", v),
            RuleKind::Title(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRuleError(String);

impl fmt::Display for ParseRuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid filter rule: {}", self.0)
    }
}

impl std::error::Error for ParseRuleError {}

/// Parses `<field><op><value>`, e.g. `length>1.5`, `key=9`, `title~kick`.
impl FromStr for FilterRule {
    type Err = ParseRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (index, operator) = s
            .char_indices()
            .find_map(|(i, c)| CompareOperator::from_symbol(c).map(|op| (i, op)))
            .ok_or_else(|| ParseRuleError(format!("missing operator in '{}'", s)))?;
        let field = s[..index].trim().to_lowercase();
        let value = s[index + 1..].trim();
        let invalid = || ParseRuleError(format!("bad value '{}' for {}", value, field));

        let kind = match field.as_str() {
            "length" => RuleKind::Length(value.parse().map_err(|_| invalid())?),
            "db" => RuleKind::LoudnessDecibel(value.parse().map_err(|_| invalid())?),
            "lufs" => RuleKind::LoudnessLufs(value.parse().map_err(|_| invalid())?),
            "tempo" => RuleKind::Tempo(value.parse().map_err(|_| invalid())?),
            "key" => {
                let key: u8 = value.parse().map_err(|_| invalid())?;
                if key >= NUM_KEYS {
                    return Err(invalid());
                }
                RuleKind::Key(key)
            }
            "title" => RuleKind::Title(value.to_string()),
            other => return Err(ParseRuleError(format!("unknown field '{}'", other))),
        };
        Ok(FilterRule::new(kind, operator))
    }
}

/// Conjunction of user-defined rules.
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    rules: Vec<FilterRule>,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    /// Returns the index of the new rule.
    pub fn add_rule(&mut self, rule: FilterRule) -> usize {
        self.rules.push(rule);
        self.rules.len() - 1
    }

    pub fn remove_rule(&mut self, index: usize) -> Option<FilterRule> {
        (index < self.rules.len()).then(|| self.rules.remove(index))
    }

    /// Returns false if there is no rule at `index`.
    pub fn set_active(&mut self, index: usize, active: bool) -> bool {
        match self.rules.get_mut(index) {
            Some(rule) => {
                rule.active = active;
                true
            }
            None => false,
        }
    }

    pub fn set_all_active(&mut self, active: bool) {
        self.rules.iter_mut().for_each(|rule| rule.active = active);
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// Whether any rule is active, i.e. whether the filtered view can differ from the catalog.
    pub fn can_have_effect(&self) -> bool {
        self.rules.iter().any(|rule| rule.active)
    }

    pub fn matches(&self, record: &SampleRecord) -> bool {
        self.rules
            .iter()
            .filter(|rule| rule.active)
            .all(|rule| rule.matches(record))
    }

    pub fn apply<'a>(&self, catalog: &'a Catalog) -> Vec<&'a SampleRecord> {
        self.filter(catalog.all())
    }

    pub fn filter<'a>(&self, records: impl Iterator<Item = &'a SampleRecord>) -> Vec<&'a SampleRecord> {
        if !self.can_have_effect() {
            return records.collect();
        }
        records.filter(|record| self.matches(record)).collect()
    }
}
