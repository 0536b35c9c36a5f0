//! Command-line construction for the external downloader

use crate::types::MediaFormat;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Arguments for one media download together with the file it will produce
///
/// The output path is derived from the template rather than parsed from the
/// tool's output, so it must stay in sync with the format flags below.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaCommand {
    /// Arguments passed to the tool, URL last
    pub args: Vec<OsString>,
    /// Path the tool writes on success
    pub expected_output: PathBuf,
}

impl MediaCommand {
    /// Build the download command for `url`
    ///
    /// # Examples
    ///
    /// ```
    /// use fetch_dl::process::MediaCommand;
    /// use fetch_dl::types::MediaFormat;
    /// use std::path::Path;
    ///
    /// let cmd = MediaCommand::new("https://youtu.be/x", Path::new("/music"), "Song", MediaFormat::Audio);
    /// assert_eq!(cmd.expected_output, Path::new("/music/Song.mp3"));
    /// ```
    pub fn new(url: &str, output_dir: &Path, base_name: &str, format: MediaFormat) -> Self {
        let mut args: Vec<OsString> = ["--newline", "--no-playlist"]
            .iter()
            .map(OsString::from)
            .collect();

        let format_args: &[&str] = match format {
            MediaFormat::Video => &["-f", "bv*+ba/b", "--merge-output-format", "mp4"],
            MediaFormat::Audio => &["-x", "--audio-format", "mp3", "--audio-quality", "0"],
        };
        args.extend(format_args.iter().map(OsString::from));

        let template = output_dir.join(format!("{base_name}.%(ext)s"));
        args.push("-o".into());
        args.push(template.into_os_string());
        args.push("--".into());
        args.push(url.into());

        Self {
            args,
            expected_output: output_dir.join(format!("{base_name}.{}", format.extension())),
        }
    }
}

/// Arguments that print the title of `url` and download nothing
pub fn title_args(url: &str) -> Vec<OsString> {
    ["--get-title", "--no-playlist", "--no-warnings", "--"]
        .iter()
        .map(OsString::from)
        .chain(std::iter::once(OsString::from(url)))
        .collect()
}
