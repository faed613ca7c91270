//! Type-name binding for payloads produced by another process.
//!
//! Every payload carries the sender's type name. Host and worker are built
//! separately, so the same message type can live at a different module path
//! on each side (`worker::proto::CompilerMessage` vs
//! `plugwire_client::envelope::CompilerMessage`). The binder maps the
//! sender's name onto a type registered in *this* process.

use std::collections::HashMap;

use crate::error::{FrameError, Result};

/// Longest type name accepted from the wire.
pub const MAX_TYPE_NAME_LEN: usize = 512;

/// How sender type names are matched against local registrations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BindPolicy {
    /// Drop the sender's module paths and resolve by the bare type name.
    #[default]
    RewriteModule,
    /// The sender's fully qualified name must match a local registration.
    Exact,
}

/// Registry of locally constructible message types, built at startup.
#[derive(Debug, Clone, Default)]
pub struct TypeBinder {
    policy: BindPolicy,
    qualified: HashMap<String, &'static str>,
    short: HashMap<String, Vec<&'static str>>,
}

impl TypeBinder {
    /// Empty binder using [`BindPolicy::RewriteModule`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty binder with an explicit policy.
    pub fn with_policy(policy: BindPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Register `T` as resolvable in this process.
    pub fn register<T: ?Sized>(mut self) -> Self {
        self.insert(wire_name::<T>());
        self
    }

    fn insert(&mut self, local: &'static str) {
        if self.qualified.insert(local.to_string(), local).is_some() {
            return;
        }
        self.short
            .entry(strip_module_paths(local))
            .or_default()
            .push(local);
    }

    /// Active policy.
    pub fn policy(&self) -> BindPolicy {
        self.policy
    }

    /// True if `T` has been registered.
    pub fn contains<T: ?Sized>(&self) -> bool {
        self.qualified.contains_key(wire_name::<T>())
    }

    /// Resolve a sender's type name to the local qualified name.
    pub fn resolve(&self, sender_name: &str) -> Result<&'static str> {
        validate_type_name(sender_name)?;

        if let Some(&local) = self.qualified.get(sender_name) {
            return Ok(local);
        }

        if self.policy == BindPolicy::Exact {
            return Err(FrameError::UnresolvedType(sender_name.to_string()));
        }

        let rewritten = strip_module_paths(sender_name);
        match self.short.get(&rewritten).map(Vec::as_slice) {
            Some(&[local]) => {
                tracing::trace!(sender = sender_name, local, "rebound payload type");
                Ok(local)
            }
            Some(candidates) if candidates.len() > 1 => Err(FrameError::UnresolvedType(format!(
                "{sender_name} (ambiguous: {})",
                candidates.join(", ")
            ))),
            _ => Err(FrameError::UnresolvedType(sender_name.to_string())),
        }
    }
}

/// The type name this process writes into payloads for `T`.
pub fn wire_name<T: ?Sized>() -> &'static str {
    std::any::type_name::<T>()
}

/// Strip module qualification from every path in a type name.
///
/// `alloc::vec::Vec<worker::proto::Source>` becomes `Vec<Source>`.
pub fn strip_module_paths(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut start = 0usize;
    for (idx, ch) in name.char_indices() {
        if is_type_delimiter(ch) {
            push_last_segment(&mut out, &name[start..idx]);
            out.push(ch);
            start = idx + ch.len_utf8();
        }
    }
    push_last_segment(&mut out, &name[start..]);
    out
}

fn push_last_segment(out: &mut String, path: &str) {
    out.push_str(path.rsplit("::").next().unwrap_or(path));
}

fn is_type_delimiter(ch: char) -> bool {
    matches!(
        ch,
        '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' | '*'
    )
}

fn validate_type_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_TYPE_NAME_LEN {
        return Err(FrameError::InvalidTypeName(format!(
            "type name length {} outside 1..={}",
            name.len(),
            MAX_TYPE_NAME_LEN
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(FrameError::InvalidTypeName(name.escape_debug().to_string()));
    }
    Ok(())
}
