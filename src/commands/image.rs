use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use crate::commands::{GlobalArgs, Settings, emit, print_dry_run};
use crate::error::ZpError;
use crate::relay::batch::BatchReport;
use crate::zhipu::Endpoint;
use crate::zhipu::image::{GeneratedImage, ImageRequest};

#[derive(Debug, Args, Clone)]
pub struct ImageArgs {
    /// Prompts of 5-500 characters; more than one runs as a batch
    #[arg(required = true)]
    pub prompts: Vec<String>,
    /// 1024x1024, 1024x768, 768x1024, 512x512 or 768x768
    #[arg(long, default_value = "1024x1024")]
    pub size: String,
    /// standard or hd
    #[arg(long, default_value = "standard")]
    pub quality: String,
    /// Download generated images into this directory
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}

pub fn run(args: ImageArgs, global: &GlobalArgs) -> Result<(), String> {
    let settings = Settings::resolve(global)?;
    settings.log_verbose("image");

    let template = ImageRequest {
        size: args.size,
        quality: args.quality,
        model: settings.model.clone(),
        ..ImageRequest::new("")
    };

    if settings.dry_run {
        let calls = args
            .prompts
            .iter()
            .map(|prompt| {
                ImageRequest {
                    prompt: prompt.clone(),
                    ..template.clone()
                }
                .envelope()
                .map(|envelope| (Endpoint::Images, envelope))
            })
            .collect::<Result<Vec<_>, ZpError>>()
            .map_err(|err| err.to_string())?;
        print_dry_run(&settings, &calls);
        return Ok(());
    }

    let client = settings.client()?;
    let out_dir = args.out_dir.as_deref();
    if let [prompt] = args.prompts.as_slice() {
        let request = ImageRequest {
            prompt: prompt.clone(),
            ..template
        };
        let result = match out_dir {
            Some(dir) => client.generate_and_save(&request, dir, 1),
            None => client.generate_image(&request),
        };
        return emit(&settings, result, render_one);
    }
    let report = client.generate_batch(&args.prompts, &template, out_dir, &settings.batch_runner());
    emit(&settings, Ok(report), render_batch)
}

fn image_line(image: &GeneratedImage) -> String {
    match &image.local_path {
        Some(path) => format!("{} -> {}", image.url.blue(), path.display()),
        None => format!("{}", image.url.blue()),
    }
}

fn render_one(image: &GeneratedImage) {
    println!("{}", image_line(image));
}

fn render_batch(report: &BatchReport<String, GeneratedImage>) {
    for entry in &report.results {
        match (entry.result(), entry.error()) {
            (Some(image), _) => println!("[{}] {}", entry.index, image_line(image)),
            (None, Some(error)) => println!("[{}] {} {error}", entry.index, "error".red()),
            (None, None) => {}
        }
    }
    println!(
        "total={} successful={} failed={}",
        report.total, report.successful, report.failed
    );
}
