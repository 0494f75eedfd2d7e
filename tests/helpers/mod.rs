use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const CHECKSUM: &str = "3c5e0e5a2b8f1d4c7a9e6b3d2f1a0c9e8d7b6a5f4e3d2c1b0a9f8e7d6c5b4a39";

/// Shell body of a fake `ostree` that answers each subcommand with canned
/// output and records its arguments in `args.log` next to itself.
const FAKE_OSTREE: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/args.log"
case "$1" in
refs)
printf 'exampleos/x86_64/main\nexampleos/x86_64/devel\n'
;;
rev-parse)
echo "@CHECKSUM@"
;;
cat)
printf '\377\376bin\000ary'
;;
log)
cat <<'OUT'
commit @CHECKSUM@
Parent:  0f9e8d7c6b5a
ContentChecksum:  aa11bb22cc33
Date:  2023-06-14 09:25:02 +0000
Version: 38.20230614.0

    Update base packages

    Rebuilt against new glibc.

commit 0f9e8d7c6b5a
Date:  2023-06-01 18:00:00 +0200

    Initial import

OUT
;;
show)
cat <<'OUT'
commit @CHECKSUM@
Date:  2023-06-14 09:25:02 +0000

    Update base packages

OUT
;;
diff)
if [ "$2" = "broken" ]; then
printf 'A    /usr/bin/new-tool\n'
echo "error: Couldn't find file object 'broken'" >&2
exit 1
fi
printf 'A    /usr/bin/new-tool\nM    /usr/etc/os-release\nR    /usr/lib/libold.so.1\n'
;;
ls)
if [ "$2" = "--recursive" ]; then
printf 'd00755 0 0      0 /usr\nd00755 0 0      0 /usr/bin\n-00755 0 0  12345 /usr/bin/bash\nl00777 0 0      4 /usr/bin/sh -> bash\n'
else
printf 'd00755 0 0      0 /usr\n-00644 0 0    512 /usr/hosts\n'
fi
;;
*)
echo "error: Unknown command '$1'" >&2
exit 1
;;
esac
"#;

/// Helper to create a fake ostree executable in a temp directory
pub fn create_fake_ostree() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let binary = temp_dir.path().join("ostree");

    fs::write(&binary, FAKE_OSTREE.replace("@CHECKSUM@", CHECKSUM))
        .expect("Failed to write fake ostree");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755))
            .expect("Failed to make fake ostree executable");
    }

    (temp_dir, binary)
}

/// Arguments of every invocation of the fake ostree, one line per call
pub fn recorded_args(temp_dir: &TempDir) -> Vec<String> {
    fs::read_to_string(temp_dir.path().join("args.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Helper to create an on-disk ostree repository layout
pub fn create_repo_layout(path: &Path) {
    fs::create_dir_all(path.join("objects")).expect("Failed to create objects dir");
    fs::create_dir_all(path.join("refs").join("heads")).expect("Failed to create refs dir");
    fs::write(path.join("config"), "[core]\nrepo_version=1\nmode=archive-z2\n")
        .expect("Failed to write repo config");
}
