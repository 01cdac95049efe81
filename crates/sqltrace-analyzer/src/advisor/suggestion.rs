//! Suggestion and analysis result types

use serde::{Deserialize, Serialize};

/// Severity level for suggestions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Likely the dominant cost of the query
    High,
    /// Worth addressing once high-severity issues are fixed
    Medium,
    /// Informational
    Low,
}

impl Severity {
    /// Sort rank: High first
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }

    pub fn is_high(&self) -> bool {
        matches!(self, Self::High)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Type of optimization suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    /// Missing index that could improve performance
    MissingIndex,
    /// Sequential scan on a large table, reported without an index proposal
    SequentialScanLargeTable,
    /// Inefficient join strategy
    InefficientJoin,
    /// Sort likely to exceed memory and spill to disk
    SortSpillRisk,
    /// Candidate indexes exist but none was used
    UnusedIndexHint,
    Other,
}

impl SuggestionType {
    /// Returns a human-readable description of this suggestion type
    pub fn description(&self) -> &'static str {
        match self {
            Self::MissingIndex => "Consider adding an index",
            Self::SequentialScanLargeTable => "Sequential scan on large table",
            Self::InefficientJoin => "Inefficient join strategy",
            Self::SortSpillRisk => "Sort may spill to disk",
            Self::UnusedIndexHint => "Available index not used",
            Self::Other => "General observation",
        }
    }
}

/// A single optimization suggestion tied to one plan node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub suggestion_type: SuggestionType,
    pub severity: Severity,
    pub title: String,
    /// Human-readable explanation of the issue
    pub description: String,
    /// Suggested action to improve performance
    pub recommendation: String,
    /// Expected effect of following the recommendation
    pub impact: String,
    /// Index of the node in the analyzed plan tree
    pub node_index: usize,
}

impl Suggestion {
    pub fn new(
        suggestion_type: SuggestionType,
        severity: Severity,
        node_index: usize,
        title: impl Into<String>,
    ) -> Self {
        Self {
            suggestion_type,
            severity,
            title: title.into(),
            description: String::new(),
            recommendation: String::new(),
            impact: String::new(),
            node_index,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = recommendation.into();
        self
    }

    pub fn with_impact(mut self, impact: impl Into<String>) -> Self {
        self.impact = impact.into();
        self
    }
}

/// Headline figures of an analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_suggestions: usize,
    pub high_severity_count: usize,
    /// Largest node cost in the plan (0 when no node reports cost)
    pub total_cost: f64,
    /// Node type of the most expensive node
    pub most_expensive_operation: Option<String>,
    pub potential_improvement: String,
}

/// Result of running the advisor over a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorAnalysis {
    /// Ordered High to Low, then by plan pre-order
    pub suggestions: Vec<Suggestion>,
    /// Overall performance score (0-100, higher = better)
    pub performance_score: u8,
    pub summary: AnalysisSummary,
}

impl AdvisorAnalysis {
    pub fn has_high_severity(&self) -> bool {
        self.summary.high_severity_count > 0
    }

    pub fn suggestion_count(&self) -> usize {
        self.suggestions.len()
    }

    /// Suggestions attached to one node
    pub fn suggestions_for(&self, node_index: usize) -> impl Iterator<Item = &Suggestion> {
        self.suggestions
            .iter()
            .filter(move |s| s.node_index == node_index)
    }
}

/// Maps a score to its improvement bucket
pub fn potential_improvement(score: u8) -> &'static str {
    match score {
        80.. => "Query appears well optimized",
        60..=79 => "Moderate improvement available",
        _ => "Significant optimization recommended",
    }
}
