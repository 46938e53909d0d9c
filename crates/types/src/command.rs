//! Redacting command model.
//!
//! A [`Command`] is a program plus an ordered list of [`Arg`]s. An argument is a plain
//! string, a [`Secret`], or an [`Elidable`] token made of nested fragments. Each argument
//! resolves two ways:
//!
//! - execution form ([`Arg::resolve_exec`]): secrets contribute their real value;
//! - display form ([`Arg::resolve_display`]): secrets contribute [`SECRET_MASK`].
//!
//! Only the display form may reach logs, work item summaries, or error messages.
//! `Debug` and `Display` for every type here render the display form.

use std::fmt;
use std::path::{Path, PathBuf};

/// Token substituted for every secret in the display form.
pub const SECRET_MASK: &str = "{secret}";

/// A sensitive value whose real bytes only appear in the execution form.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the real value. Callers must only hand this to a process or socket.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({SECRET_MASK})")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(SECRET_MASK)
    }
}

/// One logical argument token built from an ordered concatenation of fragments.
///
/// Fragments may themselves be `Elidable`, so a URL with an embedded token can be
/// composed from smaller pieces without ever flattening the secret into plain text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Elidable(Vec<Arg>);

impl Elidable {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a fragment.
    pub fn with(mut self, fragment: impl Into<Arg>) -> Self {
        self.0.push(fragment.into());
        self
    }

    pub fn fragments(&self) -> &[Arg] {
        &self.0
    }
}

impl<A: Into<Arg>> FromIterator<A> for Elidable {
    fn from_iter<I: IntoIterator<Item = A>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A single command argument fragment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Arg {
    Plain(String),
    Secret(Secret),
    Elidable(Elidable),
}

impl Arg {
    /// Resolves the argument with secrets replaced by their real values.
    pub fn resolve_exec(&self) -> String {
        let mut out = String::new();
        self.write_exec(&mut out);
        out
    }

    /// Resolves the argument with secrets replaced by [`SECRET_MASK`].
    pub fn resolve_display(&self) -> String {
        let mut out = String::new();
        self.write_display(&mut out);
        out
    }

    /// Whether any fragment, at any nesting depth, is a secret.
    pub fn has_secret(&self) -> bool {
        match self {
            Arg::Plain(_) => false,
            Arg::Secret(_) => true,
            Arg::Elidable(elidable) => elidable.0.iter().any(Arg::has_secret),
        }
    }

    fn write_exec(&self, out: &mut String) {
        match self {
            Arg::Plain(value) => out.push_str(value),
            Arg::Secret(secret) => out.push_str(secret.expose()),
            Arg::Elidable(elidable) => elidable.0.iter().for_each(|fragment| fragment.write_exec(out)),
        }
    }

    fn write_display(&self, out: &mut String) {
        match self {
            Arg::Plain(value) => out.push_str(value),
            Arg::Secret(_) => out.push_str(SECRET_MASK),
            Arg::Elidable(elidable) => elidable.0.iter().for_each(|fragment| fragment.write_display(out)),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resolve_display())
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Plain(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Plain(value)
    }
}

impl From<&String> for Arg {
    fn from(value: &String) -> Self {
        Arg::Plain(value.clone())
    }
}

impl From<&Path> for Arg {
    fn from(value: &Path) -> Self {
        Arg::Plain(value.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for Arg {
    fn from(value: PathBuf) -> Self {
        Arg::from(value.as_path())
    }
}

impl From<&PathBuf> for Arg {
    fn from(value: &PathBuf) -> Self {
        Arg::from(value.as_path())
    }
}

impl From<Secret> for Arg {
    fn from(value: Secret) -> Self {
        Arg::Secret(value)
    }
}

impl From<&Secret> for Arg {
    fn from(value: &Secret) -> Self {
        Arg::Secret(value.clone())
    }
}

impl From<Elidable> for Arg {
    fn from(value: Elidable) -> Self {
        Arg::Elidable(value)
    }
}

/// An external program invocation whose arguments may carry secrets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    program: String,
    args: Vec<Arg>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[Arg] {
        &self.args
    }

    /// Full argv in execution form, program first.
    pub fn resolve_exec(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().map(Arg::resolve_exec))
            .collect()
    }

    /// Space-joined command line in display form.
    pub fn resolve_display(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().map(Arg::resolve_display))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resolve_display())
    }
}
