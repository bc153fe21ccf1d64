//! Compiler configuration
//!
//! Defaults are right for interactive use; the driver can tighten or relax
//! them through the builder methods or by loading a `[analysis]`/`[target]`
//! TOML table from a project file.
//!
//! # Example
//!
//! ```rust,ignore
//! use vicc::CompilerConfig;
//!
//! let config = CompilerConfig::new()
//!     .with_stop_on_first_error(true)
//!     .with_max_errors(20);
//! ```

use serde::Deserialize;

use crate::analysis::AnalysisTiers;
use crate::il::lower::LowerOptions;
use crate::typechecker::TypeCheckOptions;

/// Analysis-pass knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Definite assignment and variable usage.
    pub tier1: bool,
    /// Dead code and liveness (needs CFGs).
    pub tier2: bool,
    /// Purity, loop analysis and target hints (needs the call graph).
    pub tier3: bool,
    pub report_warnings: bool,
    pub stop_on_first_error: bool,
    /// Soft cap on stored errors; counting continues past it.
    pub max_errors: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            tier1: true,
            tier2: true,
            tier3: true,
            report_warnings: true,
            stop_on_first_error: false,
            max_errors: Some(100),
        }
    }
}

/// Target placement parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// First zero-page address handed to `@zp` globals.
    pub zp_base: u32,
    /// Last usable zero-page address.
    pub zp_limit: u32,
}

impl Default for TargetConfig {
    fn default() -> Self {
        TargetConfig {
            zp_base: 0x0A,
            zp_limit: 0x8F,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub analysis: AnalysisConfig,
    pub target: TargetConfig,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse compiler config: {e}"))
    }

    pub fn with_tiers(mut self, tier1: bool, tier2: bool, tier3: bool) -> Self {
        self.analysis.tier1 = tier1;
        self.analysis.tier2 = tier2;
        self.analysis.tier3 = tier3;
        self
    }

    /// Skip all advanced analyses; the front-end still type-checks.
    pub fn without_advanced_analysis(self) -> Self {
        self.with_tiers(false, false, false)
    }

    pub fn with_stop_on_first_error(mut self, stop: bool) -> Self {
        self.analysis.stop_on_first_error = stop;
        self
    }

    pub fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.analysis.max_errors = Some(max_errors);
        self
    }

    pub fn with_warnings(mut self, report: bool) -> Self {
        self.analysis.report_warnings = report;
        self
    }

    pub fn with_zero_page_band(mut self, base: u32, limit: u32) -> Self {
        self.target.zp_base = base;
        self.target.zp_limit = limit;
        self
    }

    pub(crate) fn tiers(&self) -> AnalysisTiers {
        AnalysisTiers {
            tier1: self.analysis.tier1,
            tier2: self.analysis.tier2,
            tier3: self.analysis.tier3,
        }
    }

    pub(crate) fn typecheck_options(&self) -> TypeCheckOptions {
        TypeCheckOptions {
            stop_on_first_error: self.analysis.stop_on_first_error,
            report_warnings: self.analysis.report_warnings,
        }
    }

    pub(crate) fn lower_options(&self) -> LowerOptions {
        LowerOptions {
            zp_base: self.target.zp_base,
            zp_limit: self.target.zp_limit,
        }
    }
}
