use thiserror::Error;

/// Failure kinds of a lupin run; each carries a short context
#[derive(Debug, Error)]
pub enum LupinError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("training failed: {0}")]
    Training(String),
    #[error("clustering failed: {0}")]
    Clustering(String),
    #[error("failed to write output: {0}")]
    Output(String),
}

impl LupinError {
    pub fn kind(&self) -> &'static str {
        match self {
            LupinError::InvalidInput(_) => "InvalidInput",
            LupinError::InvalidConfig(_) => "InvalidConfig",
            LupinError::Training(_) => "Training",
            LupinError::Clustering(_) => "Clustering",
            LupinError::Output(_) => "Output",
        }
    }

    pub fn context(&self) -> &str {
        match self {
            LupinError::InvalidInput(c)
            | LupinError::InvalidConfig(c)
            | LupinError::Training(c)
            | LupinError::Clustering(c)
            | LupinError::Output(c) => c,
        }
    }
}

/// How much of a failure is shown to the user
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[clap(rename_all = "lowercase")]
pub enum ErrorReport {
    /// a single generic failure line
    Generic,
    /// error kind and its context
    #[default]
    Kind,
    /// error kind, context and the full chain of causes
    Full,
}

pub const GENERIC_FAILURE_MESSAGE: &str = "lupin failed; rerun with `--error-report kind` for details";

/// Kind and context of an error; errors that were never classified
/// are reported as `Unclassified`
pub fn error_kind_context(err: &anyhow::Error) -> (&'static str, String) {
    match err.downcast_ref::<LupinError>() {
        Some(e) => (e.kind(), e.context().to_string()),
        None => ("Unclassified", err.to_string()),
    }
}

/// One line describing `err` at the requested detail
pub fn report_error(err: &anyhow::Error, report: ErrorReport) -> String {
    let (kind, context) = error_kind_context(err);
    match report {
        ErrorReport::Generic => GENERIC_FAILURE_MESSAGE.to_string(),
        ErrorReport::Kind => format!("kind={} context={}", kind, context),
        ErrorReport::Full => {
            let causes = err
                .chain()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(": ");
            format!("kind={} context={} causes={}", kind, context, causes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    fn failing() -> anyhow::Result<()> {
        let io: Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such file",
        ));
        io.context(LupinError::InvalidInput("data.tsv".into()))
    }

    #[test]
    fn kind_is_found_through_context() {
        let err = failing().unwrap_err();
        let (kind, context) = error_kind_context(&err);
        assert_eq!(kind, "InvalidInput");
        assert_eq!(context, "data.tsv");

        assert_eq!(
            report_error(&err, ErrorReport::Kind),
            "kind=InvalidInput context=data.tsv"
        );
        assert_eq!(report_error(&err, ErrorReport::Generic), GENERIC_FAILURE_MESSAGE);

        let full = report_error(&err, ErrorReport::Full);
        assert!(full.contains("no such file"), "{}", full);
    }

    #[test]
    fn outer_context_wins() {
        let err = failing()
            .context(LupinError::Output("latent.parquet".into()))
            .unwrap_err();
        assert_eq!(error_kind_context(&err).0, "Output");
    }

    #[test]
    fn unclassified_errors() {
        let err = anyhow::anyhow!("boom");
        assert_eq!(
            report_error(&err, ErrorReport::Kind),
            "kind=Unclassified context=boom"
        );
    }
}
