//! The guest's virtual environment.
//!
//! A `WasiConfiguration` describes everything a guest instance is given:
//! environment variables, program arguments, where its standard streams go,
//! and which host directories it may reach.  It is assembled once with a
//! `WasiConfigurationBuilder` and is read-only afterwards.  Requests to
//! inherit the host's environment or arguments are resolved when the
//! configuration is built, never later.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use crate::types::Rights;
use anyhow::Result;
use log::debug;
use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf};

////////////////////////////////////////////////////////////////////////////////
// Standard streams and preopened directories.
////////////////////////////////////////////////////////////////////////////////

/// Where one of the guest's standard streams is connected.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdioRedirect {
    /// The corresponding stream of the host process.
    Inherit,
    /// A host file.  Input is opened for reading; output is created or
    /// truncated when the instance is created.
    Path(PathBuf),
    /// Nothing: reads see end-of-stream, writes are accepted and dropped.
    Disabled,
}

impl Default for StdioRedirect {
    #[inline]
    fn default() -> Self {
        StdioRedirect::Disabled
    }
}

/// A host directory made available to the guest under `guest_path`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Preopen {
    /// The directory on the host filesystem.
    pub host_path: PathBuf,
    /// The name the guest sees, reported by `fd_prestat_dir_name`.
    pub guest_path: String,
    /// Rights of the directory descriptor itself.
    pub rights_base: Rights,
    /// Upper bound on the rights of descriptors opened beneath it.
    pub rights_inheriting: Rights,
}

////////////////////////////////////////////////////////////////////////////////
// The configuration.
////////////////////////////////////////////////////////////////////////////////

/// Runtime environment for a guest instance.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WasiConfiguration {
    /// The environment variables, in order.  Keys need not be unique.
    pub environment_variables: Vec<(String, String)>,
    /// The program arguments, starting with the program name if any.
    pub program_arguments: Vec<String>,
    pub stdin: StdioRedirect,
    pub stdout: StdioRedirect,
    pub stderr: StdioRedirect,
    /// Preopened directories, installed at descriptors 3, 4, ... in order.
    pub preopens: Vec<Preopen>,
    /// Whether strace-like output is logged for every syscall.
    pub enable_strace: bool,
}

impl WasiConfiguration {
    /// Starts an empty configuration.
    #[inline]
    pub fn builder() -> WasiConfigurationBuilder {
        WasiConfigurationBuilder::default()
    }

    /// Reads a configuration from its JSON representation, e.g.
    ///
    /// ```json
    /// {
    ///   "environment_variables": [["HOME", "/home/guest"]],
    ///   "program_arguments": ["main.wasm", "--verbose"],
    ///   "stdout": "inherit",
    ///   "preopens": [{
    ///     "host_path": "/srv/data",
    ///     "guest_path": "/data",
    ///     "rights_base": "FD_READ | PATH_OPEN",
    ///     "rights_inheriting": "FD_READ"
    ///   }]
    /// }
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

////////////////////////////////////////////////////////////////////////////////
// The builder.
////////////////////////////////////////////////////////////////////////////////

/// Builds a `WasiConfiguration`.  Every method consumes and returns the
/// builder so calls can be chained.
///
/// When a field is given both explicit values and the matching `inherit_*`
/// request, the explicit values win, whichever was called last.
#[derive(Clone, Debug, Default)]
pub struct WasiConfigurationBuilder {
    environment_variables: Option<Vec<(String, String)>>,
    inherit_env: bool,
    program_arguments: Option<Vec<String>>,
    inherit_args: bool,
    stdin: StdioRedirect,
    stdout: StdioRedirect,
    stderr: StdioRedirect,
    preopens: Vec<Preopen>,
    enable_strace: bool,
}

impl WasiConfigurationBuilder {
    /// Appends one environment variable.
    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.environment_variables
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
        self
    }

    /// Replaces the environment variables with `pairs`.
    pub fn environment_variables<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.environment_variables = Some(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        );
        self
    }

    /// Uses a snapshot of the host process's environment, taken by `build`.
    #[inline]
    pub fn inherit_env(mut self) -> Self {
        self.inherit_env = true;
        self
    }

    /// Appends one program argument.
    pub fn arg<A: Into<String>>(mut self, arg: A) -> Self {
        self.program_arguments
            .get_or_insert_with(Vec::new)
            .push(arg.into());
        self
    }

    /// Replaces the program arguments with `args`.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.program_arguments = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Uses a snapshot of the host process's arguments, taken by `build`.
    #[inline]
    pub fn inherit_args(mut self) -> Self {
        self.inherit_args = true;
        self
    }

    #[inline]
    pub fn stdin(mut self, redirect: StdioRedirect) -> Self {
        self.stdin = redirect;
        self
    }

    #[inline]
    pub fn stdout(mut self, redirect: StdioRedirect) -> Self {
        self.stdout = redirect;
        self
    }

    #[inline]
    pub fn stderr(mut self, redirect: StdioRedirect) -> Self {
        self.stderr = redirect;
        self
    }

    /// Feeds standard input from the host file at `path`.
    pub fn stdin_path<P: Into<PathBuf>>(self, path: P) -> Self {
        self.stdin(StdioRedirect::Path(path.into()))
    }

    /// Sends standard output to the host file at `path`.
    pub fn stdout_path<P: Into<PathBuf>>(self, path: P) -> Self {
        self.stdout(StdioRedirect::Path(path.into()))
    }

    /// Sends standard error to the host file at `path`.
    pub fn stderr_path<P: Into<PathBuf>>(self, path: P) -> Self {
        self.stderr(StdioRedirect::Path(path.into()))
    }

    pub fn inherit_stdin(self) -> Self {
        self.stdin(StdioRedirect::Inherit)
    }

    pub fn inherit_stdout(self) -> Self {
        self.stdout(StdioRedirect::Inherit)
    }

    pub fn inherit_stderr(self) -> Self {
        self.stderr(StdioRedirect::Inherit)
    }

    /// Connects all three standard streams to the host process's.
    pub fn inherit_stdio(self) -> Self {
        self.inherit_stdin().inherit_stdout().inherit_stderr()
    }

    /// Grants the guest read and write access to `host_path`, visible as
    /// `guest_path`.
    pub fn preopened_dir<P, G>(self, host_path: P, guest_path: G) -> Self
    where
        P: Into<PathBuf>,
        G: Into<String>,
    {
        self.preopened_dir_with_rights(host_path, guest_path, Rights::READ_WRITE, Rights::READ_WRITE)
    }

    /// Grants the guest access to `host_path`, visible as `guest_path`,
    /// limited by the given rights.
    pub fn preopened_dir_with_rights<P, G>(
        mut self,
        host_path: P,
        guest_path: G,
        rights_base: Rights,
        rights_inheriting: Rights,
    ) -> Self
    where
        P: Into<PathBuf>,
        G: Into<String>,
    {
        self.preopens.push(Preopen {
            host_path: host_path.into(),
            guest_path: guest_path.into(),
            rights_base,
            rights_inheriting,
        });
        self
    }

    #[inline]
    pub fn strace(mut self, enable: bool) -> Self {
        self.enable_strace = enable;
        self
    }

    /// Produces the configuration, snapshotting the host environment and
    /// arguments if they were requested and no explicit values were given.
    pub fn build(self) -> WasiConfiguration {
        let environment_variables = match self.environment_variables {
            Some(explicit) => explicit,
            None if self.inherit_env => env::vars_os()
                .map(|(key, value)| {
                    (
                        key.to_string_lossy().into_owned(),
                        value.to_string_lossy().into_owned(),
                    )
                })
                .collect(),
            None => Vec::new(),
        };
        let program_arguments = match self.program_arguments {
            Some(explicit) => explicit,
            None if self.inherit_args => env::args_os()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
            None => Vec::new(),
        };
        debug!(
            "WASI configuration built: {} environment variables, {} arguments, {} preopens",
            environment_variables.len(),
            program_arguments.len(),
            self.preopens.len()
        );
        WasiConfiguration {
            environment_variables,
            program_arguments,
            stdin: self.stdin,
            stdout: self.stdout,
            stderr: self.stderr,
            preopens: self.preopens,
            enable_strace: self.enable_strace,
        }
    }
}
