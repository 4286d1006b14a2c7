//! Names and identity of the instrumentation API that injected calls bind to.

use crate::metadata::identity::{AssemblyIdentity, AssemblyVersion};

/// Configuration of the instrumentation API surface
///
/// Every type and member referenced by injected calls is looked up by name in the assembly
/// described by `instrumentation_assembly`. The defaults describe the CallTarget API of
/// `Datadog.Trace`; other builds of the API can override single names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTargetConfig {
    /// The assembly hosting the instrumentation API
    pub instrumentation_assembly: AssemblyIdentity,

    /// Type hosting the begin/end/log members (static class)
    pub invoker_type: String,
    /// The call-state value type returned by begin and consumed by end
    pub state_type: String,
    /// The return wrapper value type of methods without a return value
    pub void_return_type: String,
    /// The generic return wrapper value type, including its arity suffix
    pub return_type: String,

    /// Name of the begin member
    pub begin_method: String,
    /// Name of the end member
    pub end_method: String,
    /// Name of the exception logging member
    pub log_exception: String,
    /// Name of the generic default value helper on the invoker
    pub get_default_value: String,
    /// Name of the static default getter on state and return wrappers
    pub get_default: String,
    /// Name of the return value getter on the generic return wrapper
    pub get_return_value: String,
}

impl Default for CallTargetConfig {
    fn default() -> Self {
        Self {
            instrumentation_assembly: AssemblyIdentity::new(
                "Datadog.Trace",
                AssemblyVersion::new(1, 0, 0, 0),
            )
            .with_public_key_token([0xde, 0xf8, 0x6d, 0x06, 0x1d, 0x0d, 0x2e, 0xeb]),
            invoker_type: "Datadog.Trace.ClrProfiler.CallTarget.CallTargetInvoker".to_string(),
            state_type: "Datadog.Trace.ClrProfiler.CallTarget.CallTargetState".to_string(),
            void_return_type: "Datadog.Trace.ClrProfiler.CallTarget.CallTargetReturn".to_string(),
            return_type: "Datadog.Trace.ClrProfiler.CallTarget.CallTargetReturn`1".to_string(),
            begin_method: "BeginMethod".to_string(),
            end_method: "EndMethod".to_string(),
            log_exception: "LogException".to_string(),
            get_default_value: "GetDefaultValue".to_string(),
            get_default: "GetDefault".to_string(),
            get_return_value: "GetReturnValue".to_string(),
        }
    }
}

impl CallTargetConfig {
    /// Creates the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds to a different build of the instrumentation assembly
    #[must_use]
    pub fn with_instrumentation_assembly(mut self, identity: AssemblyIdentity) -> Self {
        self.instrumentation_assembly = identity;
        self
    }

    /// Moves the four API types into `namespace`, keeping their simple names
    #[must_use]
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        for name in [
            &mut self.invoker_type,
            &mut self.state_type,
            &mut self.void_return_type,
            &mut self.return_type,
        ] {
            let simple = name.rsplit('.').next().unwrap_or_default().to_string();
            *name = if namespace.is_empty() {
                simple
            } else {
                format!("{namespace}.{simple}")
            };
        }
        self
    }

    /// Overrides the name of the type hosting the begin/end/log members
    #[must_use]
    pub fn with_invoker_type(mut self, name: impl Into<String>) -> Self {
        self.invoker_type = name.into();
        self
    }
}
