//! Fake external tools for tests.
//!
//! The scripts stand in for ffprobe/ffmpeg so whole pipelines run without media
//! tooling installed. They follow the same argument conventions as the real
//! command builders: the input follows `-i`, the output is the last argument.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Writes 4 KiB of zeros to the output, comfortably above the default threshold.
pub const WRITE_OUTPUT: &str = "dd if=/dev/zero of=\"$last\" bs=1024 count=4 2>/dev/null";

/// Copies the input bytes to the output.
pub const COPY_INPUT: &str = "cat \"$in\" > \"$last\"";

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Fake ffmpeg. Every invocation appends its arguments to `ffmpeg.log` in `dir`
/// before running `body` with `$in` and `$last` bound.
pub fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
    let log = dir.join("ffmpeg.log");
    let script = format!(
        "echo \"$*\" >> \"{}\"\nin=\"\"\nprev=\"\"\nfor a; do\n  [ \"$prev\" = \"-i\" ] && in=\"$a\"\n  prev=\"$a\"\n  last=\"$a\"\ndone\n{}",
        log.display(),
        body
    );
    write_script(dir, "ffmpeg", &script)
}

/// Fake ffprobe that prints `<input>.probe.json`, failing when it is absent.
pub fn fake_ffprobe(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "ffprobe",
        "for last; do :; done\ncat \"$last.probe.json\" 2>/dev/null || { echo 'Invalid data found' >&2; exit 1; }",
    )
}

/// Lines of the fake ffmpeg invocation log.
pub fn ffmpeg_calls(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("ffmpeg.log"))
        .map(|s| s.lines().map(String::from).collect())
        .unwrap_or_default()
}

/// Places a media file and the probe JSON the fake ffprobe returns for it.
pub fn media_file(
    dir: &Path,
    name: &str,
    format_name: &str,
    codec: &str,
    width: u32,
    height: u32,
    bit_rate: u64,
) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("{} payload for {}", codec, name)).unwrap();
    let json = format!(
        r#"{{
  "streams": [
    {{"index": 0, "codec_type": "video", "codec_name": "{codec}", "width": {width}, "height": {height}, "bit_rate": "{bit_rate}"}},
    {{"index": 1, "codec_type": "audio", "codec_name": "mp2"}}
  ],
  "format": {{"format_name": "{format_name}", "duration": "60.000000", "bit_rate": "{bit_rate}"}}
}}"#
    );
    let mut probe_name = path.as_os_str().to_owned();
    probe_name.push(".probe.json");
    fs::write(PathBuf::from(probe_name), json).unwrap();
    path
}

/// Number of entries in `dir`, zero if it does not exist.
pub fn entry_count(dir: &Path) -> usize {
    fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
