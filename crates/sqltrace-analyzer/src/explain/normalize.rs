//! Plan Normalizer - nested raw plans to flat [`PlanTree`]s
//!
//! Engine adapters emit plans in one nested JSON shape: each node is an object
//! with its operation under a type key and its sub-plans under a children key.
//! The normalizer walks that shape in pre-order and assigns every node the next
//! index. A parent reserves its slot before descending and fills in its
//! children list once they have been visited, so indices always follow
//! pre-order and children always come after their parent.

use crate::explain::plan::{PlanNode, PlanTree};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqltrace_core::{Engine, ParseError, ParseErrorKind, PlanPath};

/// Field labels of the nested raw form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPlanFormat {
    pub node_type_key: String,
    pub children_key: String,
    pub relation_key: String,
    pub alias_key: String,
    pub startup_cost_key: String,
    pub total_cost_key: String,
    pub actual_startup_time_key: String,
    pub actual_total_time_key: String,
    pub actual_rows_key: String,
}

impl Default for RawPlanFormat {
    fn default() -> Self {
        Self {
            node_type_key: "Node Type".into(),
            children_key: "Plans".into(),
            relation_key: "Relation Name".into(),
            alias_key: "Alias".into(),
            startup_cost_key: "Startup Cost".into(),
            total_cost_key: "Total Cost".into(),
            actual_startup_time_key: "Actual Startup Time".into(),
            actual_total_time_key: "Actual Total Time".into(),
            actual_rows_key: "Actual Rows".into(),
        }
    }
}

impl RawPlanFormat {
    fn is_recognized(&self, key: &str) -> bool {
        [
            &self.node_type_key,
            &self.children_key,
            &self.relation_key,
            &self.alias_key,
            &self.startup_cost_key,
            &self.total_cost_key,
            &self.actual_startup_time_key,
            &self.actual_total_time_key,
            &self.actual_rows_key,
        ]
        .into_iter()
        .any(|known| known == key)
    }
}

/// Output of an engine adapter: top-level nodes in the nested raw form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPlan {
    pub engine: Engine,
    pub roots: Vec<Value>,
    /// Planning time reported alongside the plan, in milliseconds
    pub planning_time_ms: Option<f64>,
    /// Total execution time reported alongside the plan, in milliseconds
    pub execution_time_ms: Option<f64>,
}

impl RawPlan {
    pub fn new(engine: Engine, roots: Vec<Value>) -> Self {
        Self {
            engine,
            roots,
            planning_time_ms: None,
            execution_time_ms: None,
        }
    }

    pub fn with_planning_time(mut self, ms: f64) -> Self {
        self.planning_time_ms = Some(ms);
        self
    }

    pub fn with_execution_time(mut self, ms: f64) -> Self {
        self.execution_time_ms = Some(ms);
        self
    }

    /// Normalizes the roots with the given normalizer
    pub fn normalize(&self, normalizer: &PlanNormalizer) -> Result<NormalizedPlan, ParseError> {
        Ok(NormalizedPlan {
            engine: self.engine,
            tree: normalizer.normalize(&self.roots)?,
            planning_time_ms: self.planning_time_ms,
            execution_time_ms: self.execution_time_ms,
        })
    }
}

/// A plan tree together with the engine-level timings reported next to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPlan {
    pub engine: Engine,
    pub tree: PlanTree,
    pub planning_time_ms: Option<f64>,
    pub execution_time_ms: Option<f64>,
}

/// Converts the nested raw form into a [`PlanTree`]
#[derive(Debug, Clone, Default)]
pub struct PlanNormalizer {
    format: RawPlanFormat,
}

impl PlanNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(format: RawPlanFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> &RawPlanFormat {
        &self.format
    }

    /// Normalizes the given top-level nodes; root order is preserved
    pub fn normalize(&self, roots: &[Value]) -> Result<PlanTree, ParseError> {
        let mut nodes = Vec::new();
        let mut root_indices = Vec::with_capacity(roots.len());
        for (position, root) in roots.iter().enumerate() {
            let index = self.visit(root, PlanPath::root().index(position), &mut nodes)?;
            root_indices.push(index);
        }
        Ok(PlanTree::from_normalized(nodes, root_indices))
    }

    fn visit(
        &self,
        value: &Value,
        path: PlanPath,
        nodes: &mut Vec<PlanNode>,
    ) -> Result<usize, ParseError> {
        let object = value
            .as_object()
            .ok_or_else(|| ParseError::new(path.clone(), ParseErrorKind::NodeNotObject))?;

        let format = &self.format;
        let node_type = match object.get(&format.node_type_key) {
            Some(Value::String(node_type)) => node_type.clone(),
            None | Some(Value::Null) => {
                return Err(ParseError::new(
                    path.key(&format.node_type_key),
                    ParseErrorKind::MissingNodeType {
                        field: format.node_type_key.clone(),
                    },
                ));
            }
            Some(_) => {
                return Err(ParseError::new(
                    path.key(&format.node_type_key),
                    ParseErrorKind::NodeTypeNotString {
                        field: format.node_type_key.clone(),
                    },
                ));
            }
        };

        let node = PlanNode {
            node_type,
            relation_name: optional_string(object, &format.relation_key, &path)?,
            alias: optional_string(object, &format.alias_key, &path)?,
            startup_cost: optional_number(object, &format.startup_cost_key, &path)?,
            total_cost: optional_number(object, &format.total_cost_key, &path)?,
            actual_startup_time: optional_number(object, &format.actual_startup_time_key, &path)?,
            actual_total_time: optional_number(object, &format.actual_total_time_key, &path)?,
            actual_rows: optional_count(object, &format.actual_rows_key, &path)?,
            extra: object
                .iter()
                .filter(|(key, _)| !format.is_recognized(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect::<IndexMap<_, _>>(),
            children: Vec::new(),
        };

        let sub_plans: &[Value] = match object.get(&format.children_key) {
            None | Some(Value::Null) => &[],
            Some(Value::Array(sub_plans)) => sub_plans,
            Some(_) => {
                return Err(ParseError::new(
                    path.key(&format.children_key),
                    ParseErrorKind::ChildrenNotArray {
                        field: format.children_key.clone(),
                    },
                ));
            }
        };

        let index = nodes.len();
        nodes.push(node);

        let children_path = path.key(&format.children_key);
        let mut children = Vec::with_capacity(sub_plans.len());
        for (position, sub_plan) in sub_plans.iter().enumerate() {
            children.push(self.visit(sub_plan, children_path.index(position), nodes)?);
        }
        nodes[index].children = children;

        Ok(index)
    }
}

/// Normalizes with the default field labels
pub fn normalize(roots: &[Value]) -> Result<PlanTree, ParseError> {
    PlanNormalizer::new().normalize(roots)
}

fn optional_string(
    object: &Map<String, Value>,
    key: &str,
    path: &PlanPath,
) -> Result<Option<String>, ParseError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ParseError::new(
            path.key(key),
            ParseErrorKind::InvalidString { field: key.into() },
        )),
    }
}

fn optional_number(
    object: &Map<String, Value>,
    key: &str,
    path: &PlanPath,
) -> Result<Option<f64>, ParseError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v.is_finite() && v >= 0.0 => Ok(Some(v)),
            _ => Err(invalid_number(key, path)),
        },
        Some(_) => Err(invalid_number(key, path)),
    }
}

/// Row counts may arrive as fractional per-loop averages; they are rounded
fn optional_count(
    object: &Map<String, Value>,
    key: &str,
    path: &PlanPath,
) -> Result<Option<u64>, ParseError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(v) = n.as_u64() {
                return Ok(Some(v));
            }
            match n.as_f64() {
                Some(v) if v.is_finite() && v >= 0.0 => Ok(Some(v.round() as u64)),
                _ => Err(invalid_number(key, path)),
            }
        }
        Some(_) => Err(invalid_number(key, path)),
    }
}

fn invalid_number(key: &str, path: &PlanPath) -> ParseError {
    ParseError::new(
        path.key(key),
        ParseErrorKind::InvalidNumber { field: key.into() },
    )
}
