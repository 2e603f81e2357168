use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{
    backend::BackendKind,
    coordinator::{Conversion, StepRecord},
    validation::ValidationReport,
};

/// Reporter for rendering conversion and validation reports in various formats
pub struct TransformationReporter {
    output_format: ReportFormat,
}

/// Available output formats for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Console,
    Json,
    Yaml,
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" | "text" => Ok(ReportFormat::Console),
            "json" => Ok(ReportFormat::Json),
            "yaml" | "yml" => Ok(ReportFormat::Yaml),
            other => Err(ReportError::FormatError(format!(
                "unknown report format '{}'",
                other
            ))),
        }
    }
}

/// Summary of one conversion run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationReport {
    pub conversion: String,
    pub generated_at: String,
    pub steps: Vec<StepRecord>,
    pub output_bytes: usize,
    pub summary: TransformationSummary,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationSummary {
    pub total_steps: usize,
    pub local_steps: usize,
    pub remote_steps: usize,
    pub fallbacks: usize,
}

impl TransformationReporter {
    pub fn new() -> Self {
        Self {
            output_format: ReportFormat::Console,
        }
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn format(&self) -> ReportFormat {
        self.output_format
    }

    /// Build the report for a finished conversion
    pub fn generate_report(&self, conversion_name: &str, conversion: &Conversion) -> TransformationReport {
        let summary = self.create_summary(&conversion.steps);
        let recommendations = self.generate_recommendations(&conversion.steps);

        TransformationReport {
            conversion: conversion_name.to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            steps: conversion.steps.clone(),
            output_bytes: conversion.output.len(),
            summary,
            recommendations,
        }
    }

    /// Format the report according to the configured output format
    pub fn format_report(&self, report: &TransformationReport) -> Result<String, ReportError> {
        match self.output_format {
            ReportFormat::Console => Ok(self.format_console_report(report)),
            ReportFormat::Json => serialize_json(report),
            ReportFormat::Yaml => serialize_yaml(report),
        }
    }

    /// Format a diagnostics report from [`crate::validation::validate_document`]
    pub fn format_validation_report(&self, report: &ValidationReport) -> Result<String, ReportError> {
        match self.output_format {
            ReportFormat::Console => Ok(self.format_console_validation(report)),
            ReportFormat::Json => serialize_json(report),
            ReportFormat::Yaml => serialize_yaml(report),
        }
    }

    fn create_summary(&self, steps: &[StepRecord]) -> TransformationSummary {
        let mut summary = TransformationSummary {
            total_steps: steps.len(),
            local_steps: 0,
            remote_steps: 0,
            fallbacks: 0,
        };

        for step in steps {
            match step.backend {
                BackendKind::Local => summary.local_steps += 1,
                BackendKind::Remote => summary.remote_steps += 1,
            }
            if step.remote_failure.is_some() {
                summary.fallbacks += 1;
            }
        }

        summary
    }

    fn generate_recommendations(&self, steps: &[StepRecord]) -> Vec<String> {
        let mut recommendations = Vec::new();

        if steps.iter().any(|s| s.remote_failure.is_some()) {
            recommendations.push(
                "Remote service failed and the local engine was used; check the service with `ping`"
                    .to_string(),
            );
        }

        if recommendations.is_empty() {
            recommendations.push("Conversion completed successfully".to_string());
        }

        recommendations
    }

    fn format_console_report(&self, report: &TransformationReport) -> String {
        let mut output = String::new();

        output.push_str("=== Conversion Report ===\n\n");
        output.push_str(&format!("Conversion: {}\n", report.conversion));
        output.push_str(&format!("Output Size: {} bytes\n\n", report.output_bytes));

        output.push_str("Steps:\n");
        for step in &report.steps {
            output.push_str(&format!("  • {} via {} backend\n", step.operation, step.backend));
            if let Some(ref failure) = step.remote_failure {
                output.push_str(&format!("    remote failed first: {}\n", failure));
            }
        }

        if !report.recommendations.is_empty() {
            output.push_str("\nRecommendations:\n");
            for rec in &report.recommendations {
                output.push_str(&format!("  • {}\n", rec));
            }
        }

        output
    }

    fn format_console_validation(&self, report: &ValidationReport) -> String {
        let mut output = String::new();

        output.push_str("=== EPCIS Document Check ===\n\n");
        match report.detected_version {
            Some(version) => output.push_str(&format!("Detected Version: {}\n", version)),
            None => output.push_str("Detected Version: Unknown\n"),
        }
        output.push_str(&format!("Events: {}\n", report.event_count));
        output.push_str(&format!(
            "Status: {}\n",
            if report.is_valid { "VALID" } else { "INVALID" }
        ));

        if report.has_errors() {
            output.push_str("\nErrors:\n");
            for error in &report.errors {
                output.push_str(&format!("  • {}\n", error.message));
                if let Some(ref fix) = error.suggested_fix {
                    output.push_str(&format!("    fix: {}\n", fix));
                }
            }
        }

        if report.has_warnings() {
            output.push_str("\nWarnings:\n");
            for warning in &report.warnings {
                output.push_str(&format!("  • {}: {}\n", warning.location, warning.message));
            }
        }

        output
    }
}

impl Default for TransformationReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn serialize_json<T: Serialize>(value: &T) -> Result<String, ReportError> {
    serde_json::to_string_pretty(value).map_err(|e| ReportError::SerializationError(e.to_string()))
}

fn serialize_yaml<T: Serialize>(value: &T) -> Result<String, ReportError> {
    serde_yaml::to_string(value).map_err(|e| ReportError::SerializationError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Format error: {0}")]
    FormatError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Operation;
    use crate::validation::validate_document;

    fn fallback_conversion() -> Conversion {
        Conversion {
            output: "{}".to_string(),
            steps: vec![
                StepRecord {
                    operation: Operation::Migrate,
                    backend: BackendKind::Remote,
                    remote_failure: None,
                },
                StepRecord {
                    operation: Operation::Project,
                    backend: BackendKind::Local,
                    remote_failure: Some("Remote service returned status 503".to_string()),
                },
            ],
        }
    }

    #[test]
    fn test_reporter_with_format() {
        let reporter = TransformationReporter::new();
        assert_eq!(reporter.format(), ReportFormat::Console);
        let reporter = reporter.with_format(ReportFormat::Json);
        assert_eq!(reporter.format(), ReportFormat::Json);
    }

    #[test]
    fn test_report_format_from_str() {
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("yml".parse::<ReportFormat>().unwrap(), ReportFormat::Yaml);
        assert!("html".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_generate_report_summary() {
        let reporter = TransformationReporter::new();
        let report = reporter.generate_report("v1-to-jsonld", &fallback_conversion());

        assert_eq!(report.summary.total_steps, 2);
        assert_eq!(report.summary.remote_steps, 1);
        assert_eq!(report.summary.local_steps, 1);
        assert_eq!(report.summary.fallbacks, 1);
        assert_eq!(report.output_bytes, 2);
        assert!(report.recommendations[0].contains("ping"));
    }

    #[test]
    fn test_format_console_report() {
        let reporter = TransformationReporter::new();
        let report = reporter.generate_report("v1-to-jsonld", &fallback_conversion());
        let formatted = reporter.format_report(&report).unwrap();

        assert!(formatted.contains("=== Conversion Report ==="));
        assert!(formatted.contains("migrate via remote backend"));
        assert!(formatted.contains("project via local backend"));
        assert!(formatted.contains("status 503"));
    }

    #[test]
    fn test_format_json_and_yaml_report() {
        let report = TransformationReporter::new().generate_report("to-v2", &fallback_conversion());

        let json = TransformationReporter::new()
            .with_format(ReportFormat::Json)
            .format_report(&report)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["conversion"], "to-v2");
        assert_eq!(value["steps"][1]["backend"], "local");
        assert_eq!(value["summary"]["fallbacks"], 1);

        let yaml = TransformationReporter::new()
            .with_format(ReportFormat::Yaml)
            .format_report(&report)
            .unwrap();
        assert!(yaml.contains("conversion: to-v2"));
    }

    #[test]
    fn test_format_validation_report() {
        let report = validate_document(r#"<EPCISDocument xmlns="urn:epcglobal:epcis:xsd:2"/>"#);
        let formatted = TransformationReporter::new()
            .format_validation_report(&report)
            .unwrap();

        assert!(formatted.contains("Detected Version: 2.0"));
        assert!(formatted.contains("Warnings:"));
    }
}
