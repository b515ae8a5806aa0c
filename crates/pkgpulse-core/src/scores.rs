//! Score components, grades, and enterprise risk indicators.

use serde::{Deserialize, Serialize};

/// Letter grade banded from the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// >=90 A, >=80 B, >=70 C, >=60 D, else F.
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Grade::A
        } else if score >= 80.0 {
            Grade::B
        } else if score >= 70.0 {
            Grade::C
        } else if score >= 60.0 {
            Grade::D
        } else {
            Grade::F
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

/// Risk tier for enterprise adoption decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Approved,
    Conditional,
    Restricted,
    Prohibited,
}

/// How urgently the installed version should be updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateUrgency {
    Critical,
    High,
    Medium,
    Low,
}

/// Score confidence from data completeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Project age band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeBand {
    New,
    Established,
    Mature,
    Legacy,
}

impl AgeBand {
    /// <1y new, <3y established, <7y mature, else legacy.
    pub fn from_age_days(days: i64) -> Self {
        if days < 365 {
            AgeBand::New
        } else if days < 3 * 365 {
            AgeBand::Established
        } else if days < 7 * 365 {
            AgeBand::Mature
        } else {
            AgeBand::Legacy
        }
    }
}

/// One weighted category score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreComponent {
    /// 0-100.
    pub score: f64,
    /// Integer percentage weight; all component weights sum to 100.
    pub weight: u32,
}

impl ScoreComponent {
    pub fn new(score: f64, weight: u32) -> Self {
        Self {
            score: score.clamp(0.0, 100.0),
            weight,
        }
    }
}

/// All score components for one package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scores {
    pub overall: f64,
    pub grade: Grade,
    /// Assigned by an external post-processor over the whole corpus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentile: Option<f64>,
    pub risk_tier: RiskTier,
    pub update_urgency: UpdateUrgency,
    pub confidence: Confidence,
    #[serde(default)]
    pub confidence_factors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_age_band: Option<AgeBand>,
    pub security: ScoreComponent,
    pub maintenance: ScoreComponent,
    pub community: ScoreComponent,
    pub bus_factor: ScoreComponent,
    pub documentation: ScoreComponent,
    pub stability: ScoreComponent,
}

impl Scores {
    pub fn components(&self) -> [&ScoreComponent; 6] {
        [
            &self.security,
            &self.maintenance,
            &self.community,
            &self.bus_factor,
            &self.documentation,
            &self.stability,
        ]
    }

    pub fn weight_sum(&self) -> u32 {
        self.components().iter().map(|c| c.weight).sum()
    }
}

/// Outcome of the scoring stage. Scores exist exactly when the package's
/// data availability permits them, which this sum type enforces by
/// construction.
#[derive(Debug, Clone)]
pub enum ScoringOutcome {
    Scored(Scores),
    Unscored { reason: String },
}

impl ScoringOutcome {
    pub fn scores(&self) -> Option<&Scores> {
        match self {
            ScoringOutcome::Scored(s) => Some(s),
            ScoringOutcome::Unscored { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_bands() {
        assert_eq!(Grade::from_score(95.0), Grade::A);
        assert_eq!(Grade::from_score(90.0), Grade::A);
        assert_eq!(Grade::from_score(89.9), Grade::B);
        assert_eq!(Grade::from_score(70.0), Grade::C);
        assert_eq!(Grade::from_score(60.0), Grade::D);
        assert_eq!(Grade::from_score(59.9), Grade::F);
    }

    #[test]
    fn age_bands() {
        assert_eq!(AgeBand::from_age_days(100), AgeBand::New);
        assert_eq!(AgeBand::from_age_days(800), AgeBand::Established);
        assert_eq!(AgeBand::from_age_days(2000), AgeBand::Mature);
        assert_eq!(AgeBand::from_age_days(4000), AgeBand::Legacy);
    }

    #[test]
    fn component_score_is_clamped() {
        assert_eq!(ScoreComponent::new(130.0, 30).score, 100.0);
        assert_eq!(ScoreComponent::new(-10.0, 30).score, 0.0);
    }

    #[test]
    fn risk_tier_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RiskTier::Prohibited).unwrap(),
            "\"prohibited\""
        );
    }
}
