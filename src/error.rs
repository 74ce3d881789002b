//! Error types for the nginx operator
//!
//! Remote-store failures are classified into the cases the reconcile loop
//! branches on (`NotFound`, `AlreadyExists`, `Conflict`); everything else the
//! API server returns stays a transient `Kube` error.

use std::time::Duration;

use thiserror::Error;

use crate::template::TemplateError;

/// Main error type for operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The requested object does not exist
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind (e.g. "Deployment")
        kind: String,
        /// Object name
        name: String,
    },

    /// Create was rejected because the object already exists
    #[error("{kind} {name} already exists")]
    AlreadyExists {
        /// Resource kind
        kind: String,
        /// Object name
        name: String,
    },

    /// Write was rejected because the resourceVersion was stale
    #[error("conflict writing {kind} {name}: {message}")]
    Conflict {
        /// Resource kind
        kind: String,
        /// Object name
        name: String,
        /// Message returned by the API server
        message: String,
    },

    /// Any other Kubernetes API error (treated as transient)
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Rendering the managed resource template failed
    #[error("template error: {source}")]
    Template {
        /// The underlying template error
        #[from]
        source: TemplateError,
    },

    /// The owner's kind is not registered with the scheme
    #[error("scheme error: {kind} ({api_version}) is not registered")]
    Scheme {
        /// apiVersion of the unregistered owner
        api_version: String,
        /// Kind of the unregistered owner
        kind: String,
    },

    /// Owner reference could not be established
    #[error("ownership error for {name}: {message}")]
    Ownership {
        /// Name of the child object
        name: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// The reconcile was cancelled from outside
    #[error("reconcile cancelled")]
    Cancelled,

    /// The reconcile did not finish before its deadline
    #[error("reconcile deadline of {after:?} exceeded")]
    DeadlineExceeded {
        /// The configured deadline
        after: Duration,
    },

    /// Several independent failures from one reconcile
    #[error("{}", join_errors(.0))]
    Aggregate(Vec<Error>),
}

fn join_errors(errors: &[Error]) -> String {
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("[{}]", messages.join(", "))
}

fn flatten(errors: impl IntoIterator<Item = Error>) -> Vec<Error> {
    let mut flat = Vec::new();
    for err in errors {
        match err {
            Error::Aggregate(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }
    flat
}

impl Error {
    /// Create a not-found error
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an already-exists error
    pub fn already_exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an optimistic-concurrency conflict error
    pub fn conflict(
        kind: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an ownership error
    pub fn ownership(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ownership {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Classify a kube-rs error returned for `kind`/`name`
    ///
    /// 404 becomes `NotFound`, 409 with reason `AlreadyExists` becomes
    /// `AlreadyExists`, any other 409 becomes `Conflict`. Everything else is
    /// kept as a transient `Kube` error.
    pub fn from_kube(kind: &str, name: &str, err: kube::Error) -> Self {
        if let kube::Error::Api(response) = &err {
            match response.code {
                404 => return Self::not_found(kind, name),
                409 if response.reason == "AlreadyExists" => {
                    return Self::already_exists(kind, name)
                }
                409 => return Self::conflict(kind, name, response.message.clone()),
                _ => {}
            }
        }
        Self::Kube { source: err }
    }

    /// Combine independent failures into one value without dropping any
    ///
    /// Nested aggregates are flattened. No errors yields `Ok(())`, a single
    /// error is returned unchanged.
    pub fn aggregate(errors: impl IntoIterator<Item = Error>) -> Result<(), Error> {
        let mut flat = flatten(errors);
        match flat.len() {
            0 => Ok(()),
            1 => Err(flat.remove(0)),
            _ => Err(Error::Aggregate(flat)),
        }
    }

    /// Attach a later failure to this one, keeping both
    pub fn with(self, other: Error) -> Error {
        Error::Aggregate(flatten([self, other]))
    }

    /// True if the object was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// True if a create hit an existing object
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. })
    }

    /// True if a write lost an optimistic-concurrency race
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Check if retrying the reconcile could plausibly succeed
    ///
    /// Template, scheme, ownership and serialization errors need a code or
    /// config change. Kubernetes errors are retryable unless they are 4xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::NotFound { .. } | Error::AlreadyExists { .. } | Error::Conflict { .. } => true,
            Error::Template { .. }
            | Error::Scheme { .. }
            | Error::Ownership { .. }
            | Error::Serialization { .. } => false,
            Error::Cancelled | Error::DeadlineExceeded { .. } => true,
            Error::Aggregate(errors) => errors.iter().all(Error::is_retryable),
        }
    }

    /// Short label used for metrics and logs
    pub fn kind_label(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::AlreadyExists { .. } => "already_exists",
            Error::Conflict { .. } => "conflict",
            Error::Kube { .. } => "kube",
            Error::Template { .. } => "template",
            Error::Scheme { .. } => "scheme",
            Error::Ownership { .. } => "ownership",
            Error::Serialization { .. } => "serialization",
            Error::Cancelled => "cancelled",
            Error::DeadlineExceeded { .. } => "deadline_exceeded",
            Error::Aggregate(_) => "aggregate",
        }
    }
}
