//! Compatibility normaliser: rewrite the final PDF as version 1.4 with
//! downsampled images via Ghostscript.
//!
//! Downstream servers ingest PDF 1.4 reliably; newer object streams and very
//! high-resolution page images are the usual reasons they choke. Any failure
//! here is fatal for the file.

use crate::config::NormalizeOptions;
use crate::error::PipelineError;
use crate::pipeline::command;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Rewrites a PDF into the compatibility profile.
#[async_trait]
pub trait Compressor: Send + Sync {
    async fn normalize(&self, input: &Path, output: &Path, options: &NormalizeOptions) -> Result<(), PipelineError>;
}

/// [`Compressor`] that runs Ghostscript's `pdfwrite` device.
#[derive(Debug, Clone)]
pub struct Ghostscript {
    pub binary: PathBuf,
    pub timeout: Option<Duration>,
}

impl Ghostscript {
    pub fn new(binary: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Command-line arguments for one invocation.
    pub fn args(input: &Path, output: &Path, options: &NormalizeOptions) -> Vec<OsString> {
        let filter = options.downsample_filter.gs_name();
        let dpi = options.target_resolution;

        let mut args: Vec<OsString> = vec![
            "-sDEVICE=pdfwrite".into(),
            "-dCompatibilityLevel=1.4".into(),
            "-dNOPAUSE".into(),
            "-dBATCH".into(),
            "-dQUIET".into(),
        ];
        for kind in ["Color", "Gray", "Mono"] {
            args.push(format!("-d{kind}ImageDownsampleType=/{filter}").into());
            args.push(format!("-d{kind}ImageResolution={dpi}").into());
        }
        args.push("-dAutoRotatePages=/None".into());

        let mut output_flag = OsString::from("-sOutputFile=");
        output_flag.push(output);
        args.push(output_flag);

        if !options.embed_fonts {
            args.push("-dEmbedAllFonts=false".into());
        }
        args.push(input.into());
        args
    }
}

#[async_trait]
impl Compressor for Ghostscript {
    async fn normalize(&self, input: &Path, output: &Path, options: &NormalizeOptions) -> Result<(), PipelineError> {
        let args = Self::args(input, output, options);
        command::run_tool(&self.binary, &args, self.timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DownsampleFilter;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn default_args_match_engine_contract() {
        let args = Ghostscript::args(
            Path::new("work/with_bookmarks.pdf"),
            Path::new("out/doc.pdf"),
            &NormalizeOptions::default(),
        );
        assert_eq!(
            strings(&args),
            [
                "-sDEVICE=pdfwrite",
                "-dCompatibilityLevel=1.4",
                "-dNOPAUSE",
                "-dBATCH",
                "-dQUIET",
                "-dColorImageDownsampleType=/Bicubic",
                "-dColorImageResolution=300",
                "-dGrayImageDownsampleType=/Bicubic",
                "-dGrayImageResolution=300",
                "-dMonoImageDownsampleType=/Bicubic",
                "-dMonoImageResolution=300",
                "-dAutoRotatePages=/None",
                "-sOutputFile=out/doc.pdf",
                "-dEmbedAllFonts=false",
                "work/with_bookmarks.pdf",
            ]
        );
    }

    #[test]
    fn embedding_fonts_drops_the_flag() {
        let opts = NormalizeOptions {
            downsample_filter: DownsampleFilter::Average,
            target_resolution: 150,
            embed_fonts: true,
        };
        let args = strings(&Ghostscript::args(Path::new("a.pdf"), Path::new("b.pdf"), &opts));
        assert!(args.contains(&"-dGrayImageDownsampleType=/Average".to_string()));
        assert!(args.contains(&"-dMonoImageResolution=150".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("-dEmbedAllFonts")));
        assert_eq!(args.last().map(String::as_str), Some("a.pdf"));
    }
}
