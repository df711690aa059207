//! Maps raw advisory artifacts into user-facing advisories.

use crate::model::{Advisory, AdvisoryLevel, Alert, AlertAction, RawArtifact};

/// Builds the final advisories for one artifact, one per alert.
///
/// Empty when the artifact carries no alerts. `error` alerts become
/// `fatal` advisories, `warn` alerts stay warnings.
pub fn advisories_for(artifact: &RawArtifact) -> Vec<Advisory> {
    artifact
        .alerts
        .iter()
        .map(|alert| Advisory {
            level: match alert.action {
                AlertAction::Error => AdvisoryLevel::Fatal,
                AlertAction::Warn => AdvisoryLevel::Warn,
            },
            package: artifact.input_purl.clone(),
            url: None,
            description: describe(alert),
        })
        .collect()
}

/// Concatenates the alert's description parts, blank-line separated:
/// the typo-squatting sentence, the service description, the note, and
/// the fix, in that order, each only when present.
fn describe(alert: &Alert) -> String {
    let mut parts: Vec<String> = Vec::new();

    if alert.kind == "didYouMean" {
        if let Some(alternate) = &alert.props.alternate_package {
            parts.push(format!(
                "This package could be a typo-squatting attempt of another package ({alternate})."
            ));
        }
    }
    if let Some(description) = &alert.props.description {
        parts.push(description.clone());
    }
    if let Some(note) = &alert.props.note {
        parts.push(note.clone());
    }
    if let Some(fix) = &alert.fix {
        parts.push(format!("Fix: {}", fix.description));
    }

    parts.join("\n\n")
}
