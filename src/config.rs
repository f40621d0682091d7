use crate::{Error, Result};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How editor locations relate to cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DebugMode {
    /// Every cell is its own document, addressed by its cell id.
    Notebook,
    /// Every cell lives inside one real source file.
    InteractiveWindow,
}

/// Where the editor connects to the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenMode {
    Stdio,
    Tcp(String),
}

impl ListenMode {
    /// `stdio` or a `host:port` address.
    pub fn parse(value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case("stdio") {
            return Ok(ListenMode::Stdio);
        }
        if is_socket_addr(value) {
            Ok(ListenMode::Tcp(value.to_string()))
        } else {
            Err(Error::Config(format!(
                "Listen address must be 'stdio' or host:port, got '{}'",
                value
            )))
        }
    }
}

fn is_socket_addr(value: &str) -> bool {
    value
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
}

/// Options of the `serve` subcommand.
#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address of the kernel's debugger (host:port)
    #[arg(long, env = "JUPYTER_DAP_PROXY_KERNEL")]
    pub kernel: String,

    /// Source file holding the cells, split by `# %%` markers (`~` and $VARS are expanded)
    #[arg(long, env = "JUPYTER_DAP_PROXY_CELLS")]
    pub cells: String,

    /// How editor locations map onto cells
    #[arg(long, value_enum, default_value_t = DebugMode::InteractiveWindow, env = "JUPYTER_DAP_PROXY_MODE")]
    pub mode: DebugMode,

    /// Where the editor connects: 'stdio' or host:port
    #[arg(long, default_value = "stdio", env = "JUPYTER_DAP_PROXY_LISTEN")]
    pub listen: String,

    /// Added to every kernel line; negative when the kernel prepends lines to cell code
    #[arg(long, default_value_t = 0, allow_hyphen_values = true, env = "JUPYTER_DAP_PROXY_CODE_GEN_OFFSET")]
    pub code_gen_offset: i64,

    /// Leave dumped cell files in place when a session ends
    #[arg(long)]
    pub keep_dump_files: bool,

    /// Log every source location exchanged with the editor
    #[arg(long)]
    pub trace_locations: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

/// Validated proxy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub mode: DebugMode,
    pub listen: ListenMode,
    pub kernel_addr: String,
    pub cells_file: PathBuf,
    pub code_gen_offset: i64,
    pub keep_dump_files: bool,
    pub trace_locations: bool,
}

/// The part of [`ProxyConfig`] every session needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub mode: DebugMode,
    pub code_gen_offset: i64,
    pub keep_dump_files: bool,
    pub trace_locations: bool,
}

impl ProxyConfig {
    pub fn from_args(args: &ServeArgs) -> Result<Self> {
        let config = Self {
            mode: args.mode,
            listen: ListenMode::parse(&args.listen)?,
            kernel_addr: args.kernel.clone(),
            cells_file: expand_path(&args.cells)?,
            code_gen_offset: args.code_gen_offset,
            keep_dump_files: args.keep_dump_files,
            trace_locations: args.trace_locations,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_socket_addr(&self.kernel_addr) {
            return Err(Error::Config(format!(
                "Kernel address must be host:port, got '{}'",
                self.kernel_addr
            )));
        }
        if !self.cells_file.is_file() {
            return Err(Error::Config(format!(
                "Cells file not found: {}",
                self.cells_file.display()
            )));
        }
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            mode: self.mode,
            code_gen_offset: self.code_gen_offset,
            keep_dump_files: self.keep_dump_files,
            trace_locations: self.trace_locations,
        }
    }
}

/// Expand `~` and environment variables in a user-supplied path.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    shellexpand::full(raw)
        .map(|expanded| PathBuf::from(expanded.as_ref()))
        .map_err(|e| Error::Config(format!("Cannot expand '{}': {}", raw, e)))
}
