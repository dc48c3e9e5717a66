// cli.rs — 命令行参数 (手动扫描 std::env::args)

use dualfish::player::{parse_size, RawVideo};
use dualfish::ProjectionConfig;
use std::path::PathBuf;

const DEFAULT_FPS: f32 = 30.0;

#[derive(Debug, Default, PartialEq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub image: Option<PathBuf>,
    pub video: Option<RawVideo>,
    /// 视频用展开的平面而不是球
    pub rect: bool,
}

pub fn parse(args: impl IntoIterator<Item = String>) -> Result<CliArgs, String> {
    let mut out = CliArgs::default();
    let mut yuv: Option<PathBuf> = None;
    let mut size: Option<(u32, u32)> = None;
    let mut fps = DEFAULT_FPS;

    let mut it = args.into_iter();
    while let Some(a) = it.next() {
        let mut value = |flag: &str| it.next().ok_or_else(|| format!("{flag} needs a value"));
        match a.as_str() {
            "--config" => out.config = Some(PathBuf::from(value("--config")?)),
            "--image" => out.image = Some(PathBuf::from(value("--image")?)),
            "--yuv" => yuv = Some(PathBuf::from(value("--yuv")?)),
            "--size" => {
                let text = value("--size")?;
                size = Some(parse_size(&text).ok_or_else(|| format!("bad --size `{text}`, expected WxH"))?);
            }
            "--fps" => {
                let text = value("--fps")?;
                fps = text
                    .parse::<f32>()
                    .ok()
                    .filter(|f| f.is_finite() && *f > 0.0)
                    .ok_or_else(|| format!("bad --fps `{text}`"))?;
            }
            "--rect" => out.rect = true,
            other => log::warn!("ignoring unknown argument `{}`", other),
        }
    }

    if let Some(path) = yuv {
        let (width, height) = size.ok_or("--yuv needs --size WxH")?;
        out.video = Some(RawVideo {
            path,
            width,
            height,
            fps,
        });
    }
    Ok(out)
}

/// --config 优先，其次环境变量 PANORAMA_CONFIG，都没有就用默认参数
pub fn resolve_config(args: &CliArgs) -> dualfish::Result<ProjectionConfig> {
    let path = args.config.clone().or_else(|| {
        std::env::var("PANORAMA_CONFIG")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
    });
    match path {
        Some(path) => ProjectionConfig::load(&path),
        None => Ok(ProjectionConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_command_line() {
        assert_eq!(parse(args(&[])).unwrap(), CliArgs::default());
    }

    #[test]
    fn video_with_size_and_rate() {
        let parsed = parse(args(&["--yuv", "clip.yuv", "--size", "1920x960", "--fps", "25", "--rect"])).unwrap();
        assert!(parsed.rect);
        assert_eq!(
            parsed.video,
            Some(RawVideo {
                path: PathBuf::from("clip.yuv"),
                width: 1920,
                height: 960,
                fps: 25.0,
            })
        );
    }

    #[test]
    fn video_without_size_is_an_error() {
        assert!(parse(args(&["--yuv", "clip.yuv"])).is_err());
    }

    #[test]
    fn missing_values_are_errors() {
        assert!(parse(args(&["--image"])).is_err());
        assert!(parse(args(&["--size", "wide"])).is_err());
        assert!(parse(args(&["--fps", "-3"])).is_err());
    }

    #[test]
    fn image_and_config_paths() {
        let parsed = parse(args(&["--config", "rig.json", "--image", "pano.jpg"])).unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("rig.json")));
        assert_eq!(parsed.image, Some(PathBuf::from("pano.jpg")));
        assert!(parsed.video.is_none());
    }
}
