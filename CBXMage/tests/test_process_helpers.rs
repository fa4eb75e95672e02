//! Integration tests for external tool helpers
//! Executable resolution uses throwaway files in a temporary directory

use cbxmage::process::{find_executable, list2cmdline, which};
use std::path::Path;

#[test]
fn test_find_executable_none_found() {
    let found = find_executable(&["cbxmage-missing-tool-a", "cbxmage-missing-tool-b"], None);
    assert_eq!(found, None);
}

#[test]
fn test_list2cmdline_windows_paths() {
    let line = list2cmdline(&[
        r"C:\Program Files\7-Zip\7z.exe",
        "x",
        r"D:\comics\issue 1.cb7",
        "-o",
    ]);
    assert_eq!(
        line,
        r#""C:\Program Files\7-Zip\7z.exe" x "D:\comics\issue 1.cb7" -o"#
    );
}

#[cfg(unix)]
mod unix {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn make_tool(dir: &Path, name: &str, mode: u32) -> String {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_find_executable_with_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tool = make_tool(dir.path(), "fake-unrar", 0o755);

        assert_eq!(which(&tool).as_deref(), Some(Path::new(&tool)));
        assert_eq!(
            find_executable(&["cbxmage-missing-tool", tool.as_str()], None),
            Some(tool.clone())
        );
    }

    #[test]
    fn test_find_executable_skips_non_executable() {
        let dir = tempfile::tempdir().unwrap();
        let plain = make_tool(dir.path(), "not-runnable", 0o644);
        let runnable = make_tool(dir.path(), "runnable", 0o755);

        assert_eq!(which(&plain), None);
        assert_eq!(
            find_executable(&[plain.as_str(), runnable.as_str()], None),
            Some(runnable)
        );
    }

    #[test]
    fn test_find_executable_validity_check() {
        let dir = tempfile::tempdir().unwrap();
        let old = make_tool(dir.path(), "unrar-free", 0o755);
        let good = make_tool(dir.path(), "unrar", 0o755);

        let not_free: &dyn Fn(&Path) -> bool =
            &|path: &Path| !path.to_string_lossy().ends_with("-free");
        assert_eq!(
            find_executable(&[old.as_str(), good.as_str()], Some(not_free)),
            Some(good)
        );
    }
}
