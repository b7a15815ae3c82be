//! Driving the external mesh engine (gmsh).
//!
//! [`EngineDriver::run`] writes the geometry script to a scratch `.geo`
//! file, runs the engine with a scratch `.msh` output path, streams the
//! engine's stdout and stderr as [`EngineEvent`]s, maps a non-zero exit
//! status to [`MeshError::EngineFailure`], and decodes the output. Both
//! scratch files are owned by the call and removed on every exit path.

use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;
use tracing::{debug, info, trace, warn};

use crate::error::{MeshError, MeshResult};
use crate::msh;
use crate::progress::CancellationToken;
use crate::tracing_ext::{OperationTimer, log_engine_command};
use crate::types::Mesh;

/// How often cancellation and the timeout are checked while waiting for output.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Per-run engine flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Pass `-optimize`.
    pub optimize: bool,
    /// Engine-side Lloyd iterations (`-optimize_lloyd N`); 0 omits the flag.
    pub lloyd_iterations: usize,
    /// Deliver engine output lines as they arrive.
    pub verbose: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            lloyd_iterations: 10,
            verbose: true,
        }
    }
}

/// Where the engine lives and how it is run. Resolved once, passed explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Engine executable.
    pub executable: PathBuf,
    /// Kill the engine after this long.
    pub timeout: Option<Duration>,
    /// Directory for scratch files (system temp dir when `None`).
    pub scratch_dir: Option<PathBuf>,
}

impl EngineConfig {
    /// Environment variable that overrides the executable in [`detect`](Self::detect).
    pub const ENV_VAR: &'static str = "MESH_GEN_GMSH";

    /// Use the given executable, no timeout, system temp dir.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            timeout: None,
            scratch_dir: None,
        }
    }

    /// The executable from `MESH_GEN_GMSH`, else the platform default.
    pub fn detect() -> Self {
        match std::env::var_os(Self::ENV_VAR) {
            Some(path) if !path.is_empty() => Self::new(path),
            _ => Self::default(),
        }
    }

    /// The usual install location of gmsh on this platform.
    pub fn default_executable() -> PathBuf {
        if cfg!(target_os = "macos") {
            PathBuf::from("/Applications/Gmsh.app/Contents/MacOS/gmsh")
        } else {
            PathBuf::from("gmsh")
        }
    }

    /// Set a time limit for each run.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Put scratch files in `dir`.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(Self::default_executable())
    }
}

/// Something the engine run reports while it is going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// One line of engine output (stdout and stderr interleaved).
    OutputLine(String),
    /// The engine terminated; `-1` when killed by a signal.
    Exit { code: i32 },
}

/// The engine argument vector (everything after the executable).
pub fn engine_args(script: &Path, output: &Path, options: &EngineOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-3".into(),
        script.into(),
        "-o".into(),
        output.into(),
    ];
    if options.optimize {
        args.push("-optimize".into());
    }
    if options.lloyd_iterations > 0 {
        args.push("-optimize_lloyd".into());
        args.push(options.lloyd_iterations.to_string().into());
    }
    args
}

/// Runs the engine on geometry scripts.
#[derive(Debug, Clone)]
pub struct EngineDriver {
    config: EngineConfig,
    cancel: CancellationToken,
}

impl EngineDriver {
    /// Create a driver for the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop runs when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Mesh `script` and decode the result.
    ///
    /// The sink receives every output line when `options.verbose` is set, and
    /// always receives the final [`EngineEvent::Exit`].
    pub fn run(
        &self,
        script: &str,
        options: &EngineOptions,
        mut sink: Option<&mut dyn FnMut(&EngineEvent)>,
    ) -> MeshResult<Mesh> {
        if script.trim().is_empty() {
            return Err(MeshError::InvalidScript {
                details: "geometry produced no code".into(),
            });
        }
        if self.cancel.is_cancelled() {
            return Err(MeshError::EngineCancelled);
        }
        let _timer = OperationTimer::new("engine");

        let mut script_file = self.scratch_file(".geo")?;
        script_file
            .write_all(script.as_bytes())
            .and_then(|_| script_file.flush())
            .map_err(|e| MeshError::io_write(script_file.path(), e))?;
        let output_file = self.scratch_file(".msh")?;

        let args = engine_args(script_file.path(), output_file.path(), options);
        log_engine_command(&self.config.executable, &args);

        let code = self.execute(&args, options.verbose, &mut sink)?;
        if code != 0 {
            warn!(target: "mesh_gen::engine", exit_code = code, "Mesh engine failed");
            return Err(MeshError::engine_failure(code));
        }

        msh::read_msh(output_file.path())
    }

    fn scratch_file(&self, suffix: &str) -> MeshResult<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("mesh-gen-").suffix(suffix);
        match &self.config.scratch_dir {
            Some(dir) => builder
                .tempfile_in(dir)
                .map_err(|e| MeshError::io_write(dir, e)),
            None => builder
                .tempfile()
                .map_err(|e| MeshError::io_write(std::env::temp_dir(), e)),
        }
    }

    fn execute(
        &self,
        args: &[OsString],
        verbose: bool,
        sink: &mut Option<&mut dyn FnMut(&EngineEvent)>,
    ) -> MeshResult<i32> {
        let spawn_error = |source| MeshError::EngineSpawn {
            executable: self.config.executable.clone(),
            source,
        };
        let mut child = Command::new(&self.config.executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;
        debug!(target: "mesh_gen::engine", pid = child.id(), "Engine started");

        let (tx, rx) = mpsc::channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, tx.clone()));
        }
        drop(tx);

        let started = Instant::now();
        let mut output_open = true;
        let finished = loop {
            if output_open {
                match rx.recv_timeout(POLL_INTERVAL) {
                    Ok(line) => deliver_line(line, verbose, sink),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => output_open = false,
                }
            } else {
                // Both pipes are closed but the process may still be running.
                match child.try_wait() {
                    Ok(Some(status)) => break Ok(status),
                    Ok(None) => thread::sleep(POLL_INTERVAL),
                    Err(e) => break Err(spawn_error(e)),
                }
            }
            if self.cancel.is_cancelled() {
                break Err(MeshError::EngineCancelled);
            }
            if let Some(limit) = self.config.timeout {
                if started.elapsed() >= limit {
                    break Err(MeshError::EngineTimeout {
                        seconds: limit.as_secs_f64(),
                    });
                }
            }
        };

        let status = match finished {
            Ok(status) => status,
            Err(err) => {
                // Readers are left to finish on their own; the pipes close once
                // the killed process is gone.
                let code = kill_and_reap(&mut child);
                emit(sink, EngineEvent::Exit { code });
                warn!(target: "mesh_gen::engine", error = %err, "Engine run interrupted");
                return Err(err);
            }
        };

        for reader in readers {
            if reader.join().is_err() {
                warn!(target: "mesh_gen::engine", "Engine output reader panicked; output may be incomplete");
            }
        }
        let code = status.code().unwrap_or(-1);
        debug!(target: "mesh_gen::engine", exit_code = code, "Engine exited");
        emit(sink, EngineEvent::Exit { code });
        Ok(code)
    }
}

fn spawn_reader<R: Read + Send + 'static>(stream: R, tx: Sender<String>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

fn deliver_line(line: String, verbose: bool, sink: &mut Option<&mut dyn FnMut(&EngineEvent)>) {
    if !verbose {
        trace!(target: "mesh_gen::engine", "{}", line);
        return;
    }
    match sink.as_deref_mut() {
        Some(sink) => {
            debug!(target: "mesh_gen::engine", "{}", line);
            sink(&EngineEvent::OutputLine(line));
        }
        None => info!(target: "mesh_gen::engine", "{}", line),
    }
}

fn emit(sink: &mut Option<&mut dyn FnMut(&EngineEvent)>, event: EngineEvent) {
    if let Some(sink) = sink.as_deref_mut() {
        sink(&event);
    }
}

fn kill_and_reap(child: &mut Child) -> i32 {
    if let Err(e) = child.kill() {
        debug!(target: "mesh_gen::engine", error = %e, "Engine already exited");
    }
    match child.wait() {
        Ok(status) => status.code().unwrap_or(-1),
        Err(_) => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_engine_args_shape() {
        let args = engine_args(
            Path::new("/tmp/a.geo"),
            Path::new("/tmp/a.msh"),
            &EngineOptions::default(),
        );
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec!["-3", "/tmp/a.geo", "-o", "/tmp/a.msh", "-optimize", "-optimize_lloyd", "10"]
        );

        let plain = EngineOptions {
            optimize: false,
            lloyd_iterations: 0,
            verbose: false,
        };
        assert_eq!(
            engine_args(Path::new("a.geo"), Path::new("a.msh"), &plain).len(),
            4
        );
    }

    #[test]
    fn test_empty_script_rejected() {
        let driver = EngineDriver::new(EngineConfig::new("gmsh"));
        let err = driver
            .run("  \n", &EngineOptions::default(), None)
            .unwrap_err();
        assert!(matches!(err, MeshError::InvalidScript { .. }));
    }

    #[test]
    fn test_missing_executable_is_spawn_error() {
        let scratch = TempDir::new().unwrap();
        let config = EngineConfig::new("/nonexistent/gmsh-binary").with_scratch_dir(scratch.path());
        let err = EngineDriver::new(config)
            .run("Point(1) = {0, 0, 0};", &EngineOptions::default(), None)
            .unwrap_err();
        assert!(matches!(err, MeshError::EngineSpawn { .. }));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let driver = EngineDriver::new(EngineConfig::new("gmsh")).with_cancellation(token);
        let err = driver
            .run("Point(1) = {0, 0, 0};", &EngineOptions::default(), None)
            .unwrap_err();
        assert!(matches!(err, MeshError::EngineCancelled));
    }

    #[test]
    fn test_default_executable() {
        let exe = EngineConfig::default_executable();
        assert!(exe.to_string_lossy().ends_with("gmsh"));
        assert_eq!(EngineConfig::default().timeout, None);
    }

    #[cfg(unix)]
    mod fake_engine {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        const TRIANGLE_MSH: &str = "$MeshFormat\n2.2 0 8\n$EndMeshFormat\n$Nodes\n3\n1 0 0 0\n2 1 0 0\n3 0 1 0\n$EndNodes\n$Elements\n1\n1 2 2 0 1 1 2 3\n$EndElements\n";

        fn write_engine(dir: &TempDir, body: &str) -> PathBuf {
            let path = dir.path().join("fake-gmsh");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn copying_engine(dir: &TempDir) -> PathBuf {
            let fixture = dir.path().join("fixture.msh");
            std::fs::write(&fixture, TRIANGLE_MSH).unwrap();
            write_engine(
                dir,
                &format!(
                    "echo 'Info    : Meshing 2D...'\n\
                     echo 'Warning : skinny element' >&2\n\
                     out=''\n\
                     while [ $# -gt 0 ]; do\n\
                       if [ \"$1\" = \"-o\" ]; then out=\"$2\"; fi\n\
                       shift\n\
                     done\n\
                     cp '{}' \"$out\"",
                    fixture.display()
                ),
            )
        }

        fn collect(
            driver: &EngineDriver,
            options: &EngineOptions,
        ) -> (MeshResult<Mesh>, Vec<EngineEvent>) {
            let mut events = Vec::new();
            let mut sink = |e: &EngineEvent| events.push(e.clone());
            let result = driver.run("Point(1) = {0, 0, 0};", options, Some(&mut sink));
            (result, events)
        }

        #[test]
        fn test_success_streams_output_and_cleans_up() {
            let bin = TempDir::new().unwrap();
            let scratch = TempDir::new().unwrap();
            let config = EngineConfig::new(copying_engine(&bin)).with_scratch_dir(scratch.path());
            let driver = EngineDriver::new(config);

            let (result, events) = collect(&driver, &EngineOptions::default());
            let mesh = result.unwrap();
            assert_eq!(mesh.point_count(), 3);
            assert_eq!(mesh.triangles().unwrap().len(), 1);

            assert!(events.contains(&EngineEvent::OutputLine("Info    : Meshing 2D...".into())));
            assert!(events.contains(&EngineEvent::OutputLine("Warning : skinny element".into())));
            assert_eq!(events.last(), Some(&EngineEvent::Exit { code: 0 }));
            assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
        }

        #[test]
        fn test_quiet_run_only_reports_exit() {
            let bin = TempDir::new().unwrap();
            let driver = EngineDriver::new(EngineConfig::new(copying_engine(&bin)));
            let options = EngineOptions {
                verbose: false,
                ..Default::default()
            };
            let (result, events) = collect(&driver, &options);
            assert!(result.is_ok());
            assert_eq!(events, vec![EngineEvent::Exit { code: 0 }]);
        }

        #[test]
        fn test_exit_code_propagates() {
            let bin = TempDir::new().unwrap();
            let scratch = TempDir::new().unwrap();
            let engine = write_engine(&bin, "echo 'Error   : bad script'\nexit 1");
            let driver = EngineDriver::new(EngineConfig::new(engine).with_scratch_dir(scratch.path()));

            let (result, events) = collect(&driver, &EngineOptions::default());
            match result {
                Err(MeshError::EngineFailure { exit_code }) => assert_eq!(exit_code, 1),
                other => panic!("Expected EngineFailure, got {:?}", other),
            }
            assert_eq!(events.last(), Some(&EngineEvent::Exit { code: 1 }));
            assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
        }

        #[test]
        fn test_timeout_kills_engine() {
            let bin = TempDir::new().unwrap();
            let scratch = TempDir::new().unwrap();
            let engine = write_engine(&bin, "exec sleep 10");
            let config = EngineConfig::new(engine)
                .with_timeout(Duration::from_millis(200))
                .with_scratch_dir(scratch.path());

            let started = Instant::now();
            let (result, events) = collect(&EngineDriver::new(config), &EngineOptions::default());
            assert!(matches!(result, Err(MeshError::EngineTimeout { .. })));
            assert!(started.elapsed() < Duration::from_secs(5));
            assert!(matches!(events.last(), Some(EngineEvent::Exit { .. })));
            assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
        }

        #[test]
        fn test_timeout_applies_after_output_closes() {
            let bin = TempDir::new().unwrap();
            let scratch = TempDir::new().unwrap();
            let engine = write_engine(&bin, "exec >/dev/null 2>&1; exec sleep 10");
            let config = EngineConfig::new(engine)
                .with_timeout(Duration::from_millis(200))
                .with_scratch_dir(scratch.path());

            let started = Instant::now();
            let (result, events) = collect(&EngineDriver::new(config), &EngineOptions::default());
            assert!(matches!(result, Err(MeshError::EngineTimeout { .. })));
            assert!(started.elapsed() < Duration::from_secs(5));
            assert!(matches!(events.last(), Some(EngineEvent::Exit { .. })));
            assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
        }

        #[test]
        fn test_cancellation_after_output_closes() {
            let bin = TempDir::new().unwrap();
            let engine = write_engine(&bin, "exec >/dev/null 2>&1; exec sleep 10");
            let token = CancellationToken::new();
            let driver = EngineDriver::new(EngineConfig::new(engine)).with_cancellation(token.clone());

            let canceller = thread::spawn(move || {
                thread::sleep(Duration::from_millis(150));
                token.cancel();
            });
            let started = Instant::now();
            let err = driver
                .run("Point(1) = {0, 0, 0};", &EngineOptions::default(), None)
                .unwrap_err();
            canceller.join().unwrap();
            assert!(matches!(err, MeshError::EngineCancelled));
            assert!(started.elapsed() < Duration::from_secs(5));
        }

        #[test]
        fn test_cancellation_from_another_thread() {
            let bin = TempDir::new().unwrap();
            let engine = write_engine(&bin, "exec sleep 10");
            let token = CancellationToken::new();
            let driver = EngineDriver::new(EngineConfig::new(engine)).with_cancellation(token.clone());

            let canceller = thread::spawn(move || {
                thread::sleep(Duration::from_millis(150));
                token.cancel();
            });
            let started = Instant::now();
            let err = driver
                .run("Point(1) = {0, 0, 0};", &EngineOptions::default(), None)
                .unwrap_err();
            canceller.join().unwrap();
            assert!(matches!(err, MeshError::EngineCancelled));
            assert!(started.elapsed() < Duration::from_secs(5));
        }
    }
}
