//! Process spawning for external decoder tools
//!
//! Commands are argument vectors of `OsStr`, so paths reach the child
//! without re-encoding. Standard streams default to the null device: a GUI
//! host has no console to inherit. On Windows every child is created
//! without a console window.

use crate::utils::error::{MageError, Result};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Win32 `CREATE_NO_WINDOW`
pub const CREATE_NO_WINDOW: u32 = 0x0800_0000;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// What a child's standard stream is connected to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioMode {
    Null,
    Piped,
    Inherit,
}

impl From<StdioMode> for Stdio {
    fn from(mode: StdioMode) -> Self {
        match mode {
            StdioMode::Null => Stdio::null(),
            StdioMode::Piped => Stdio::piped(),
            StdioMode::Inherit => Stdio::inherit(),
        }
    }
}

/// Process creation flags for the current platform
pub fn creation_flags() -> u32 {
    if cfg!(windows) {
        CREATE_NO_WINDOW
    } else {
        0
    }
}

fn build_command<S: AsRef<OsStr>>(args: &[S]) -> Result<Command> {
    let (program, rest) = args.split_first().ok_or_else(|| {
        MageError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "empty argument vector",
        ))
    })?;

    let mut command = Command::new(program);
    command.args(rest);

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(creation_flags());
    }

    Ok(command)
}

fn describe<S: AsRef<OsStr>>(args: &[S]) -> String {
    args.first()
        .map(|program| program.as_ref().to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Run a command to completion with every stream discarded
///
/// Returns `true` only for a zero exit status. Spawn failures are logged
/// and reported as `false`.
pub fn call<S: AsRef<OsStr>>(args: &[S]) -> bool {
    let status = build_command(args).and_then(|mut command| {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(MageError::from)
    });

    match status {
        Ok(status) => {
            tracing::debug!("{} exited with {}", describe(args), status);
            status.success()
        }
        Err(e) => {
            tracing::warn!("Failed to run {}: {}", describe(args), e);
            false
        }
    }
}

/// Start a command with the given stream wiring
///
/// The usual wiring is `Null, Piped, Null`: read the tool's output and
/// drop everything else.
pub fn popen<S: AsRef<OsStr>>(
    args: &[S],
    stdin: StdioMode,
    stdout: StdioMode,
    stderr: StdioMode,
) -> Result<Child> {
    let child = build_command(args)?
        .stdin(stdin)
        .stdout(stdout)
        .stderr(stderr)
        .spawn()?;
    tracing::debug!("Spawned {} (pid {})", describe(args), child.id());
    Ok(child)
}

/// A command running on a worker thread
///
/// Dropping the handle cancels the command and waits for the worker,
/// unless the handle was detached first.
#[derive(Debug)]
pub struct TaskHandle {
    worker: Option<JoinHandle<bool>>,
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    /// Wait for the command; `true` for a zero exit status
    pub fn join(mut self) -> bool {
        self.wait()
    }

    /// Ask the worker to kill the command
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.worker
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Let the command run on without an owner
    pub fn detach(mut self) {
        self.worker.take();
    }

    fn wait(&mut self) -> bool {
        match self.worker.take() {
            Some(worker) => worker.join().unwrap_or(false),
            None => false,
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.cancel();
            self.wait();
        }
    }
}

fn supervise(mut child: Child, cancelled: &AtomicBool) -> bool {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return status.success(),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Lost track of child {}: {}", child.id(), e);
                return false;
            }
        }
        if cancelled.load(Ordering::SeqCst) {
            tracing::debug!("Cancelling child {}", child.id());
            if let Err(e) = child.kill() {
                tracing::debug!("Kill failed: {}", e);
            }
            let _ = child.wait();
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Run a command on a worker thread with every stream discarded
///
/// The calling thread never blocks; the returned handle can be polled,
/// joined, cancelled or detached.
pub fn call_thread<S: AsRef<OsStr>>(args: &[S]) -> TaskHandle {
    let args: Vec<OsString> = args.iter().map(|a| a.as_ref().to_os_string()).collect();
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);

    let worker = thread::spawn(move || {
        match popen(&args, StdioMode::Null, StdioMode::Null, StdioMode::Null) {
            Ok(child) => supervise(child, &flag),
            Err(e) => {
                tracing::warn!("Failed to start {}: {}", describe(&args), e);
                false
            }
        }
    });

    TaskHandle {
        worker: Some(worker),
        cancelled,
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// File names to try for `name` in one directory
fn name_variants(name: &str, extensions: &[String]) -> Vec<String> {
    let mut variants = vec![name.to_string()];
    let has_known_ext = extensions
        .iter()
        .any(|ext| name.to_ascii_lowercase().ends_with(&ext.to_ascii_lowercase()));
    if !has_known_ext {
        variants.extend(extensions.iter().map(|ext| format!("{}{}", name, ext)));
    }
    variants
}

fn executable_extensions() -> Vec<String> {
    if !cfg!(windows) {
        return Vec::new();
    }
    std::env::var("PATHEXT")
        .unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string())
        .split(';')
        .filter(|ext| !ext.is_empty())
        .map(str::to_string)
        .collect()
}

fn search_dirs(path_var: Option<&OsStr>) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if cfg!(windows) {
        if let Some(dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            dirs.push(dir);
        }
    }
    if let Some(path_var) = path_var {
        dirs.extend(std::env::split_paths(path_var));
    }
    dirs
}

/// Resolve `name` the way a shell would
pub fn which(name: &str) -> Option<PathBuf> {
    which_in(name, std::env::var_os("PATH").as_deref())
}

fn which_in(name: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    let extensions = executable_extensions();
    let candidate = Path::new(name);

    // names with a directory part are not searched for
    if candidate.components().count() > 1 {
        return name_variants(name, &extensions)
            .into_iter()
            .map(PathBuf::from)
            .find(|path| is_executable(path));
    }

    search_dirs(path_var).into_iter().find_map(|dir| {
        name_variants(name, &extensions)
            .into_iter()
            .map(|variant| dir.join(variant))
            .find(|path| is_executable(path))
    })
}

/// First candidate found on the search path that passes `is_valid`
///
/// The predicate receives the resolved path (to check a version, reject a
/// symlink to an unsupported variant, ...). The candidate name is returned,
/// not the path.
pub fn find_executable<S: AsRef<str>>(
    candidates: &[S],
    is_valid: Option<&dyn Fn(&Path) -> bool>,
) -> Option<String> {
    find_executable_in(candidates, is_valid, std::env::var_os("PATH").as_deref())
}

fn find_executable_in<S: AsRef<str>>(
    candidates: &[S],
    is_valid: Option<&dyn Fn(&Path) -> bool>,
    path_var: Option<&OsStr>,
) -> Option<String> {
    candidates.iter().map(AsRef::as_ref).find_map(|name| {
        let path = which_in(name, path_var)?;
        match is_valid {
            Some(check) if !check(&path) => {
                tracing::debug!("{} rejected by validity check", path.display());
                None
            }
            _ => Some(name.to_string()),
        }
    })
}

/// Join arguments into one command line using MS C runtime quoting
///
/// Arguments with spaces or tabs (or empty ones) are double-quoted.
/// Backslashes are literal unless they precede a double quote, in which
/// case they are doubled and the quote is escaped.
pub fn list2cmdline<S: AsRef<str>>(args: &[S]) -> String {
    let mut line = String::new();

    for arg in args.iter().map(AsRef::as_ref) {
        if !line.is_empty() {
            line.push(' ');
        }

        let quote = arg.is_empty() || arg.contains([' ', '\t']);
        if quote {
            line.push('"');
        }

        let mut backslashes = 0usize;
        for c in arg.chars() {
            match c {
                '\\' => backslashes += 1,
                '"' => {
                    line.push_str(&"\\".repeat(backslashes * 2));
                    backslashes = 0;
                    line.push_str("\\\"");
                }
                _ => {
                    line.push_str(&"\\".repeat(backslashes));
                    backslashes = 0;
                    line.push(c);
                }
            }
        }

        line.push_str(&"\\".repeat(backslashes));
        if quote {
            // the closing quote must not be escaped by trailing backslashes
            line.push_str(&"\\".repeat(backslashes));
            line.push('"');
        }
    }

    line
}

/// Spawn through `CreateProcessW` directly
///
/// Returns the new process id. Both process and thread handles are closed
/// before returning.
#[cfg(windows)]
pub fn win32_popen<S: AsRef<str>>(cmd: &[S]) -> Result<u32> {
    use widestring::U16CString;
    use windows::core::{PCWSTR, PWSTR};
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Threading::{
        CreateProcessW, PROCESS_CREATION_FLAGS, PROCESS_INFORMATION, STARTUPINFOW,
    };

    let spawn_error = |message: String| MageError::Spawn { code: -1, message };

    let program = cmd
        .first()
        .map(AsRef::as_ref)
        .ok_or_else(|| spawn_error("empty argument vector".to_string()))?;
    let exe = which(program).unwrap_or_else(|| PathBuf::from(program));

    let wide_exe = U16CString::from_os_str(exe.as_os_str())
        .map_err(|e| spawn_error(format!("invalid executable path: {}", e)))?;
    let mut wide_cmdline = U16CString::from_str(list2cmdline(cmd))
        .map_err(|e| spawn_error(format!("invalid command line: {}", e)))?
        .into_vec_with_nul();

    let startup = STARTUPINFOW {
        cb: std::mem::size_of::<STARTUPINFOW>() as u32,
        ..Default::default()
    };
    let mut info = PROCESS_INFORMATION::default();

    // SAFETY: both strings are nul-terminated and outlive the call; the
    // command line buffer is mutable as CreateProcessW requires.
    unsafe {
        CreateProcessW(
            PCWSTR(wide_exe.as_ptr()),
            PWSTR(wide_cmdline.as_mut_ptr()),
            None,
            None,
            false,
            PROCESS_CREATION_FLAGS(0),
            None,
            PCWSTR::null(),
            &startup,
            &mut info,
        )
        .map_err(|e| MageError::Spawn {
            code: e.code().0,
            message: e.message().to_string(),
        })?;

        let _ = CloseHandle(info.hProcess);
        let _ = CloseHandle(info.hThread);
    }

    tracing::debug!("CreateProcessW started {} (pid {})", program, info.dwProcessId);
    Ok(info.dwProcessId)
}
