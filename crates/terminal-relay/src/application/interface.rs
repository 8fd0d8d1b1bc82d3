//! Interface definitions: which SDK methods a host type exposes and which
//! host attributes the page may call back into.
//!
//! An [`InterfaceDefinition`] is plain data built once with
//! [`InterfaceBuilder`].  Binding it to a live connection (see
//! [`binder`](super::binder)) turns each SDK method into a callable stub.
//!
//! ```text
//! host code ── stub("discover_readers") ──► {"attribute": "discoverReaders", ...}
//!                                                   │ browser SDK
//! handler(reply, args) ◄──── {"discoveredReaders": [...]} ◄┘
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use relay_core::RemoteAttributeName;

use crate::application::error::RelayError;
use crate::domain::CallArgs;

// ── Handler types ─────────────────────────────────────────────────────────────

/// Future returned by every handler.
pub type HandlerFuture = BoxFuture<'static, Result<Value, RelayError>>;

/// Post-processes an SDK reply.  Receives the decoded reply first, then the
/// arguments the host passed to the stub.
pub type ReplyHandler = Arc<dyn Fn(Value, CallArgs) -> HandlerFuture + Send + Sync>;

/// A host method the page may invoke.
pub type HostMethod = Arc<dyn Fn(CallArgs) -> HandlerFuture + Send + Sync>;

/// A host property the page may read.
pub type HostProperty = Arc<dyn Fn() -> HandlerFuture + Send + Sync>;

// ── Descriptors ───────────────────────────────────────────────────────────────

/// One declared SDK method: its host-side name, the remote attribute it maps
/// to and the reply handler.
#[derive(Clone)]
pub struct BoundMethodDescriptor {
    name: String,
    attribute: RemoteAttributeName,
    handler: ReplyHandler,
}

impl BoundMethodDescriptor {
    /// Host-side method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// SDK attribute invoked on the page.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Runs the reply handler.
    pub async fn handle(&self, reply: Value, args: CallArgs) -> Result<Value, RelayError> {
        (self.handler)(reply, args).await
    }
}

impl fmt::Debug for BoundMethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundMethodDescriptor")
            .field("name", &self.name)
            .field("attribute", &self.attribute)
            .finish_non_exhaustive()
    }
}

/// A host attribute reachable from the page.
#[derive(Clone)]
pub enum HostAttribute {
    /// Invoked with the request's args/kwargs.
    Method(HostMethod),
    /// Read; args/kwargs are ignored.
    Property(HostProperty),
}

impl HostAttribute {
    /// Wraps an async closure as a callable attribute.
    pub fn method<F, Fut>(method: F) -> Self
    where
        F: Fn(CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RelayError>> + Send + 'static,
    {
        HostAttribute::Method(Arc::new(move |args: CallArgs| -> HandlerFuture {
            Box::pin(method(args))
        }))
    }

    /// Wraps an async getter as a property.
    pub fn property<F, Fut>(getter: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RelayError>> + Send + 'static,
    {
        HostAttribute::Property(Arc::new(move || -> HandlerFuture { Box::pin(getter()) }))
    }

    /// Evaluates the attribute for one peer request.
    pub async fn resolve(&self, args: CallArgs) -> Result<Value, RelayError> {
        match self {
            HostAttribute::Method(method) => method(args).await,
            HostAttribute::Property(getter) => getter().await,
        }
    }

    /// `true` for [`HostAttribute::Method`].
    pub fn is_callable(&self) -> bool {
        matches!(self, HostAttribute::Method(_))
    }
}

impl fmt::Debug for HostAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostAttribute::Method(_) => f.write_str("HostAttribute::Method"),
            HostAttribute::Property(_) => f.write_str("HostAttribute::Property"),
        }
    }
}

// ── Definition ────────────────────────────────────────────────────────────────

/// A host type's complete relay surface.
#[derive(Debug, Clone)]
pub struct InterfaceDefinition {
    type_name: String,
    sdk_methods: BTreeMap<String, BoundMethodDescriptor>,
    host_attributes: HashMap<String, HostAttribute>,
}

impl InterfaceDefinition {
    /// Starts a builder for a host type called `type_name`.
    pub fn builder(type_name: impl Into<String>) -> InterfaceBuilder {
        InterfaceBuilder {
            definition: InterfaceDefinition {
                type_name: type_name.into(),
                sdk_methods: BTreeMap::new(),
                host_attributes: HashMap::new(),
            },
        }
    }

    /// Name used in error messages.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Declared SDK methods, ordered by name.
    pub fn sdk_methods(&self) -> impl Iterator<Item = &BoundMethodDescriptor> {
        self.sdk_methods.values()
    }

    /// Looks up one SDK method descriptor.
    pub fn sdk_method(&self, name: &str) -> Option<&BoundMethodDescriptor> {
        self.sdk_methods.get(name)
    }

    /// Looks up a host attribute by the name the page uses.
    pub fn host_attribute(&self, name: &str) -> Option<&HostAttribute> {
        self.host_attributes.get(name)
    }

    /// Host attributes keyed by name.
    pub fn host_attributes(&self) -> &HashMap<String, HostAttribute> {
        &self.host_attributes
    }

    /// Adds `attribute` under `name` unless the host already defines it.
    /// Returns `true` when the attribute was inserted.
    pub fn provide_default(&mut self, name: &str, attribute: HostAttribute) -> bool {
        if self.host_attributes.contains_key(name) {
            return false;
        }
        self.host_attributes.insert(name.to_string(), attribute);
        true
    }
}

/// Builder returned by [`InterfaceDefinition::builder`].
///
/// A later registration under the same name replaces the earlier one.
pub struct InterfaceBuilder {
    definition: InterfaceDefinition,
}

impl InterfaceBuilder {
    /// Declares an SDK method with an async reply handler.
    pub fn sdk_method<F, Fut>(
        mut self,
        name: impl Into<String>,
        attribute: impl Into<RemoteAttributeName>,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RelayError>> + Send + 'static,
    {
        let name = name.into();
        let handler: ReplyHandler =
            Arc::new(move |reply: Value, args: CallArgs| -> HandlerFuture {
                Box::pin(handler(reply, args))
            });
        self.definition.sdk_methods.insert(
            name.clone(),
            BoundMethodDescriptor {
                name,
                attribute: attribute.into(),
                handler,
            },
        );
        self
    }

    /// Declares an SDK method whose handler does no I/O.
    pub fn sdk_method_sync<F>(
        self,
        name: impl Into<String>,
        attribute: impl Into<RemoteAttributeName>,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, &CallArgs) -> Result<Value, RelayError> + Send + Sync + 'static,
    {
        self.sdk_method(name, attribute, move |reply, args| {
            let result = handler(reply, &args);
            async move { result }
        })
    }

    /// Declares an SDK method that returns the reply unchanged.
    pub fn passthrough(
        self,
        name: impl Into<String>,
        attribute: impl Into<RemoteAttributeName>,
    ) -> Self {
        self.sdk_method_sync(name, attribute, |reply, _| Ok(reply))
    }

    /// Exposes an async host method to the page.
    pub fn host_method<F, Fut>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RelayError>> + Send + 'static,
    {
        self.definition
            .host_attributes
            .insert(name.into(), HostAttribute::method(method));
        self
    }

    /// Exposes an async host property to the page.
    pub fn host_property<F, Fut>(mut self, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RelayError>> + Send + 'static,
    {
        self.definition
            .host_attributes
            .insert(name.into(), HostAttribute::property(getter));
        self
    }

    /// Exposes a constant host property.
    pub fn host_value(self, name: impl Into<String>, value: Value) -> Self {
        self.host_property(name, move || {
            let value = value.clone();
            async move { Ok(value) }
        })
    }

    /// Finishes the definition.
    pub fn build(self) -> InterfaceDefinition {
        self.definition
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
