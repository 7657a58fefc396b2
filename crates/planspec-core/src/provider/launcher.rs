use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;

use tokio::runtime::Handle;
use tonic::transport::{Channel, Endpoint};

use crate::provider::{ProviderError, ProviderPlugin};

/// Environment a provider plugin checks before serving.
pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";
const PROTOCOL_VERSIONS_KEY: &str = "PLUGIN_PROTOCOL_VERSIONS";
const PROTOCOL_VERSIONS: &str = "5";

/// Where a provider plugin lives and how to start it.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginMeta {
    pub name: String,
    pub path: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl PluginMeta {
    /// Describes a plugin started with the standard handshake environment.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            args: Vec::new(),
            env: vec![
                (MAGIC_COOKIE_KEY.to_string(), MAGIC_COOKIE_VALUE.to_string()),
                (PROTOCOL_VERSIONS_KEY.to_string(), PROTOCOL_VERSIONS.to_string()),
            ],
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// The line a plugin prints on stdout once it is serving:
/// `CORE-VERSION|APP-VERSION|NETWORK|ADDRESS|PROTOCOL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub core_version: u32,
    pub app_version: u32,
    pub network: String,
    pub address: String,
    pub protocol: String,
}

impl Handshake {
    pub fn parse(line: &str) -> Result<Self, ProviderError> {
        let parts: Vec<&str> = line.trim().split('|').collect();
        if parts.len() < 5 {
            return Err(ProviderError::Handshake(format!(
                "expected 5 fields, got {:?}",
                line.trim()
            )));
        }
        let version = |field: &str, what: &str| {
            field
                .parse::<u32>()
                .map_err(|_| ProviderError::Handshake(format!("invalid {} version {:?}", what, field)))
        };
        let handshake = Self {
            core_version: version(parts[0], "core")?,
            app_version: version(parts[1], "protocol")?,
            network: parts[2].to_string(),
            address: parts[3].to_string(),
            protocol: parts[4].to_string(),
        };
        if handshake.core_version != 1 {
            return Err(ProviderError::Handshake(format!(
                "unsupported core version {}",
                handshake.core_version
            )));
        }
        Ok(handshake)
    }

    /// Returns the address to hand to tonic.
    pub fn endpoint(&self) -> String {
        match self.network.as_str() {
            "unix" => format!("unix:{}", self.address),
            _ => crate::normalize_grpc_address(&self.address),
        }
    }
}

/// A running plugin executable. Killed and reaped on [`kill`](Self::kill)
/// or drop.
#[derive(Debug)]
pub struct PluginProcess {
    name: String,
    child: Child,
    // Held open so the plugin never writes to a closed pipe.
    stdout: BufReader<ChildStdout>,
}

impl PluginProcess {
    /// Starts the plugin and waits for its handshake line.
    pub fn spawn(meta: &PluginMeta) -> Result<(Self, Handshake), ProviderError> {
        let launch_err = |reason: String| ProviderError::Launch {
            name: meta.name.clone(),
            reason,
        };

        let mut child = Command::new(&meta.path)
            .args(&meta.args)
            .envs(meta.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| launch_err(e.to_string()))?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(launch_err("stdout was not captured".to_string()));
        };

        let mut process = Self {
            name: meta.name.clone(),
            child,
            stdout: BufReader::new(stdout),
        };
        tracing::debug!(plugin = %process.name, pid = process.child.id(), "plugin started");

        let mut line = String::new();
        let read = process.stdout.read_line(&mut line);
        let handshake = match read {
            Ok(0) => Err(ProviderError::Handshake(format!(
                "plugin {} exited before handshake",
                process.name
            ))),
            Ok(_) => Handshake::parse(&line),
            Err(e) => Err(ProviderError::Handshake(e.to_string())),
        };
        match handshake {
            Ok(h) => Ok((process, h)),
            Err(e) => {
                let _ = process.kill();
                Err(e)
            }
        }
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Terminates the plugin if it is still running. Safe to call more than
    /// once.
    pub fn kill(&mut self) -> std::io::Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        self.child.kill()?;
        self.child.wait()?;
        tracing::debug!(plugin = %self.name, "plugin stopped");
        Ok(())
    }
}

impl Drop for PluginProcess {
    fn drop(&mut self) {
        if let Err(e) = self.kill() {
            tracing::warn!(plugin = %self.name, error = %e, "failed to stop plugin");
        }
    }
}

/// A live plugin and, for out-of-process plugins, the process serving it.
pub struct PluginConnection {
    pub plugin: Arc<dyn ProviderPlugin>,
    pub process: Option<PluginProcess>,
}

/// Establishes a plugin connection. Called at most once per interceptor
/// between two closes.
pub trait PluginConnector: Send + Sync {
    fn connect(&self) -> Result<PluginConnection, ProviderError>;
}

/// Turns a connected gRPC channel into a provider client. This is where
/// the provider wire protocol plugs in.
pub trait Dispenser: Send + Sync {
    fn dispense(&self, name: &str, channel: Channel) -> Result<Arc<dyn ProviderPlugin>, ProviderError>;
}

/// Connects by launching the plugin executable and dialing the address
/// from its handshake.
pub struct ProcessConnector {
    meta: PluginMeta,
    dispenser: Arc<dyn Dispenser>,
    handle: Handle,
}

impl ProcessConnector {
    /// Creates a connector that runs its async connect on `handle`. Must be
    /// used from a multi-threaded runtime.
    pub fn new(meta: PluginMeta, dispenser: Arc<dyn Dispenser>, handle: Handle) -> Self {
        Self {
            meta,
            dispenser,
            handle,
        }
    }

    fn open(&self, handshake: &Handshake) -> Result<Channel, ProviderError> {
        if handshake.protocol != "grpc" {
            return Err(ProviderError::Handshake(format!(
                "unsupported protocol {}",
                handshake.protocol
            )));
        }
        let address = handshake.endpoint();
        let connect_err = |reason: String| ProviderError::Connect {
            address: address.clone(),
            reason,
        };

        tokio::task::block_in_place(|| {
            self.handle.block_on(async {
                if handshake.network == "unix" {
                    return connect_unix(&handshake.address).await.map_err(connect_err);
                }
                Endpoint::from_shared(address.clone())
                    .map_err(|e| connect_err(e.to_string()))?
                    .connect()
                    .await
                    .map_err(|e| connect_err(e.to_string()))
            })
        })
    }
}

impl PluginConnector for ProcessConnector {
    fn connect(&self) -> Result<PluginConnection, ProviderError> {
        let (mut process, handshake) = PluginProcess::spawn(&self.meta)?;
        tracing::debug!(
            plugin = %self.meta.name,
            network = %handshake.network,
            address = %handshake.address,
            "plugin handshake"
        );
        let plugin = self
            .open(&handshake)
            .and_then(|channel| self.dispenser.dispense(&self.meta.name, channel));
        match plugin {
            Ok(plugin) => Ok(PluginConnection {
                plugin,
                process: Some(process),
            }),
            Err(e) => {
                if let Err(kill) = process.kill() {
                    tracing::warn!(plugin = %self.meta.name, error = %kill, "failed to stop plugin");
                }
                Err(e)
            }
        }
    }
}

#[cfg(unix)]
async fn connect_unix(path: &str) -> Result<Channel, String> {
    // The URI is required by tonic but never dialed.
    Endpoint::from_static("http://[::]:50051")
        .connect_with_connector(unix::UnixConnector {
            path: PathBuf::from(path),
        })
        .await
        .map_err(|e| e.to_string())
}

#[cfg(not(unix))]
async fn connect_unix(_path: &str) -> Result<Channel, String> {
    Err("unix sockets are not supported on this platform".to_string())
}

#[cfg(unix)]
mod unix {
    use std::future::Future;
    use std::path::PathBuf;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use hyper_util::rt::TokioIo;
    use tokio::net::UnixStream;
    use tonic::codegen::http::Uri;
    use tonic::codegen::Service;

    #[derive(Clone)]
    pub(super) struct UnixConnector {
        pub(super) path: PathBuf,
    }

    impl Service<Uri> for UnixConnector {
        type Response = TokioIo<UnixStream>;
        type Error = std::io::Error;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _uri: Uri) -> Self::Future {
            let path = self.path.clone();
            Box::pin(async move { Ok(TokioIo::new(UnixStream::connect(path).await?)) })
        }
    }
}

/// Connects to a plugin that already lives in this process.
pub struct InProcessConnector {
    plugin: Arc<dyn ProviderPlugin>,
}

impl InProcessConnector {
    pub fn new(plugin: Arc<dyn ProviderPlugin>) -> Self {
        Self { plugin }
    }
}

impl PluginConnector for InProcessConnector {
    fn connect(&self) -> Result<PluginConnection, ProviderError> {
        Ok(PluginConnection {
            plugin: Arc::clone(&self.plugin),
            process: None,
        })
    }
}
