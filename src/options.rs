/// When a dispatch completes: after the response headers arrive, or after the
/// whole body has been read into memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompletionMode {
    #[default]
    Buffered,
    Streaming,
}

impl CompletionMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buffered => "buffered",
            Self::Streaming => "streaming",
        }
    }
}

/// Per-request behaviour switches. Unset fields fall through to the client
/// defaults, then to the built-in defaults exposed by the accessor methods.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Omit query arguments whose value is null. Defaults to `true`.
    pub ignore_null_arguments: Option<bool>,
    /// Hand back non-success responses instead of failing. Defaults to `false`.
    pub ignore_http_errors: Option<bool>,
    /// Defaults to [`CompletionMode::Buffered`].
    pub completion: Option<CompletionMode>,
}

impl RequestOptions {
    pub const fn new() -> Self {
        Self {
            ignore_null_arguments: None,
            ignore_http_errors: None,
            completion: None,
        }
    }

    pub fn with_ignore_null_arguments(mut self, ignore: bool) -> Self {
        self.ignore_null_arguments = Some(ignore);
        self
    }

    pub fn with_ignore_http_errors(mut self, ignore: bool) -> Self {
        self.ignore_http_errors = Some(ignore);
        self
    }

    pub fn with_completion(mut self, completion: CompletionMode) -> Self {
        self.completion = Some(completion);
        self
    }

    /// Fills every unset field of `self` from `defaults`. Values already set on
    /// `self` always win; neither input is modified.
    pub fn merged_over(&self, defaults: &RequestOptions) -> RequestOptions {
        RequestOptions {
            ignore_null_arguments: self.ignore_null_arguments.or(defaults.ignore_null_arguments),
            ignore_http_errors: self.ignore_http_errors.or(defaults.ignore_http_errors),
            completion: self.completion.or(defaults.completion),
        }
    }

    pub fn ignores_null_arguments(&self) -> bool {
        self.ignore_null_arguments.unwrap_or(true)
    }

    pub fn ignores_http_errors(&self) -> bool {
        self.ignore_http_errors.unwrap_or(false)
    }

    pub fn completion_mode(&self) -> CompletionMode {
        self.completion.unwrap_or_default()
    }
}
