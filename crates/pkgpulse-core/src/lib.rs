//! Shared data model for pkgpulse
//!
//! Every value that crosses a crate boundary lives here: package identity,
//! repository references, registry metadata, repository facts, CVE history,
//! supply-chain findings, aggregator intelligence, scores, and the persisted
//! per-package analysis artifact.
//!
//! All types are plain serde-derived value objects. The pipeline never
//! mutates a fetched sub-record once it is embedded in an analysis.

pub mod aggregator;
pub mod analysis;
pub mod cve;
pub mod llm;
pub mod package;
pub mod repo;
pub mod scores;
pub mod supply;

pub use aggregator::{AggregatorData, BasicProjectMetrics, DependencyGraphSummary, ScorecardData};
pub use analysis::{AnalysisSummary, DataAvailability, PackageAnalysis};
pub use cve::{CveDetail, CveHistory, Severity};
pub use llm::{
    ChangelogAssessment, CommunicationAssessment, GovernanceAssessment, LlmAssessments,
    MaintenanceAssessment, ReadmeAssessment, SecurityAssessment, SentimentAssessment,
};
pub use package::{Ecosystem, InstallStats, PackageMetadata, PackageRef, Platform, RepoRef};
pub use repo::{
    CiStatus, CommitActivity, ContributorStats, ContributorTrend, IssueStats, PrStats, ReleaseStats,
    RepoData, RepoFiles, RepoInfo, SecurityFacts,
};
pub use scores::{
    AgeBand, Confidence, Grade, RiskTier, ScoreComponent, Scores, ScoringOutcome, UpdateUrgency,
};
pub use supply::{
    LifecycleScriptRisk, PatternSeverity, PublishingInfo, RiskLevel, SupplyChainData,
    SuspiciousPattern, TarballAnalysis, TarballFile, VersionDiff,
};
