///! cbxmage-probe - inspect how a page image loads and renders
///!
///! Prints what the container sees in a file and optionally writes the
///! rendered cache and the thumbnail as PNG.
use anyhow::{Context, Result};
use cbxmage::{CacheBackground, Mage, MageConfig, ResizeFilter};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cbxmage-probe")]
#[command(about = "Load a page image and report its layers")]
struct Cli {
    /// Image file to load
    file: PathBuf,

    /// Decode animation frames
    #[arg(long)]
    anim: bool,

    /// Rotation in degrees (multiple of 90)
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    rotate: i32,

    /// Rendering size as WxH
    #[arg(long, value_parser = parse_size)]
    size: Option<(u32, u32)>,

    /// Resampling filter (nearest, box, triangle, catmullrom, mitchell, lanczos3)
    #[arg(long)]
    filter: Option<ResizeFilter>,

    /// Composite transparency onto a checkerboard
    #[arg(long, conflicts_with = "background")]
    checkered: bool,

    /// Solid background as hex RRGGBBAA
    #[arg(long, value_parser = parse_color)]
    background: Option<u32>,

    /// Write the rendered cache here
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write the thumbnail here
    #[arg(long)]
    thumb: Option<PathBuf>,
}

fn parse_size(value: &str) -> std::result::Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got {:?}", value))?;
    let parse = |s: &str| s.trim().parse::<u32>().map_err(|e| e.to_string());
    Ok((parse(w)?, parse(h)?))
}

fn parse_color(value: &str) -> std::result::Result<u32, String> {
    let digits = value.trim_start_matches('#').trim_start_matches("0x");
    u32::from_str_radix(digits, 16).map_err(|e| format!("{:?}: {}", value, e))
}

fn main() -> Result<()> {
    cbxmage::init_tracing();
    let cli = Cli::parse();

    let data = std::fs::read(&cli.file)
        .with_context(|| format!("Failed to read {}", cli.file.display()))?;

    let mut mage = Mage::with_config(MageConfig::from_env());
    mage.load(&data, cli.anim)
        .with_context(|| format!("Failed to load {}", cli.file.display()))?;

    let (width, height) = mage.original_size()?;
    println!("file:        {}", cli.file.display());
    println!(
        "format:      {}",
        mage.format().map(|f| f.as_str()).unwrap_or("unknown")
    );
    println!("size:        {}x{}", width, height);
    println!("alpha:       {}", mage.image()?.has_alpha());
    println!("frames:      {}", mage.frames().len());
    if mage.is_animated() {
        let total: u64 = mage.frames().iter().map(|(_, ms)| *ms as u64).sum();
        println!("duration:    {} ms", total);
        println!("loop:        {}", mage.loop_animation());
    }
    println!("background:  {:#010x}", mage.background_color());
    println!("exif tags:   {}", mage.exif().len());
    println!(
        "icc profile: {}",
        mage.icc_profile()
            .map(|p| format!("{} bytes", p.len()))
            .unwrap_or_else(|| "none".to_string())
    );

    mage.set_rotation(cli.rotate)?;
    if let Some((w, h)) = cli.size {
        mage.set_size(w, h)?;
    }
    if let Some(filter) = cli.filter {
        mage.set_filter(filter);
    }
    if cli.checkered {
        mage.set_cache_background(CacheBackground::Checkered);
    } else if let Some(color) = cli.background {
        mage.set_cache_background(CacheBackground::Color(color));
    }

    if let Some(out) = &cli.out {
        let cache = mage.cache()?;
        cache
            .as_rgba()
            .save(out)
            .with_context(|| format!("Failed to write {}", out.display()))?;
        println!(
            "cache:       {}x{} -> {}",
            cache.width(),
            cache.height(),
            out.display()
        );
    }

    if let Some(thumb) = &cli.thumb {
        let thumbnail = mage.thumbnail()?;
        thumbnail
            .as_rgba()
            .save(thumb)
            .with_context(|| format!("Failed to write {}", thumb.display()))?;
        println!(
            "thumbnail:   {}x{} -> {}",
            thumbnail.width(),
            thumbnail.height(),
            thumb.display()
        );
    }

    let stats = mage.stats();
    tracing::debug!(
        "{} cache builds, {} bitmaps released",
        stats.cache_builds,
        stats.bitmaps_released
    );
    Ok(())
}
