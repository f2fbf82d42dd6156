use thiserror::Error;

pub type Result<T> = std::result::Result<T, SurvivalError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurvivalError {
    #[error("missing required field: {field}")]
    MissingRequiredField { field: String },

    #[error("non-positive duration ({days} days) - presumed data-entry error")]
    InvalidDuration { days: i64 },

    #[error("invalid fit input: {message}")]
    InvalidInput { message: String },

    #[error("{model} fit failed on [{}]: {message}", covariates.join(", "))]
    FitFailure {
        model: String,
        covariates: Vec<String>,
        message: String,
    },

    #[error("not enough data for {context}: {observed} observations, need {minimum}")]
    DataInsufficient {
        context: String,
        observed: usize,
        minimum: usize,
    },

    #[error("dimensions don't match: {message}")]
    InvalidDimensions { message: String },

    #[error("bad parameter: {parameter} = {value}")]
    InvalidParameter { parameter: String, value: String },

    #[error("numerical issues: {message}")]
    NumericalError { message: String },

    #[error("config is broken: {message}")]
    Config { message: String },
}

impl SurvivalError {
    pub fn missing_required_field(field: impl Into<String>) -> Self {
        Self::MissingRequiredField { field: field.into() }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput { message: message.into() }
    }

    pub fn fit_failure(
        model: impl Into<String>,
        covariates: &[String],
        message: impl Into<String>,
    ) -> Self {
        Self::FitFailure {
            model: model.into(),
            covariates: covariates.to_vec(),
            message: message.into(),
        }
    }

    pub fn data_insufficient(context: impl Into<String>, observed: usize, minimum: usize) -> Self {
        Self::DataInsufficient {
            context: context.into(),
            observed,
            minimum,
        }
    }

    pub fn invalid_dimensions(message: impl Into<String>) -> Self {
        Self::InvalidDimensions { message: message.into() }
    }

    pub fn invalid_parameter(parameter: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
        }
    }

    pub fn numerical_error(message: impl Into<String>) -> Self {
        Self::NumericalError { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }
}
