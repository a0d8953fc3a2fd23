use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use facefinder::config::Config;
use facefinder::faces::{subject_id, AgeRange, ReferenceManager, SearchCriteria, TrainingPolicy};
use facefinder::logging;
use facefinder::pipeline::{ImageRecord, Pipeline, RunOutcome, SearchOptions, SearchRequest};
use facefinder::scanner::{Scanner, ThumbnailStore};
use facefinder::services::{FaceClient, VisionClient};
use facefinder::tasks::{SearchTask, TaskUpdate};

struct Args {
    config_path: Option<PathBuf>,
    command: Command,
}

enum Command {
    Search(SearchArgs),
    PersonAdd { name: String, images: Vec<PathBuf> },
    PersonDelete { name: String },
    PersonList,
    PersonShow { name: String },
}

#[derive(Default)]
struct SearchArgs {
    directory: PathBuf,
    min_age: Option<f64>,
    max_age: Option<f64>,
    male: bool,
    female: bool,
    person: Option<String>,
    thumbnails: Option<bool>,
    caption: bool,
    ocr: bool,
    metadata: bool,
    recursive: bool,
    json: bool,
}

fn usage_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    eprintln!("Run 'facefinder --help' for usage.");
    std::process::exit(2);
}

fn value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> &'a str {
    *i += 1;
    match args.get(*i) {
        Some(v) => v.as_str(),
        None => usage_error(&format!("{} requires a value", flag)),
    }
}

fn age_value(args: &[String], i: &mut usize, flag: &str) -> f64 {
    let raw = value(args, i, flag);
    raw.parse()
        .unwrap_or_else(|_| usage_error(&format!("{} expects a number, got '{}'", flag, raw)))
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut positional = Vec::new();
    let mut search = SearchArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("facefinder {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(value(&args, &mut i, "--config")));
            }
            "--min-age" => search.min_age = Some(age_value(&args, &mut i, "--min-age")),
            "--max-age" => search.max_age = Some(age_value(&args, &mut i, "--max-age")),
            "--male" => search.male = true,
            "--female" => search.female = true,
            "--person" | "-p" => search.person = Some(value(&args, &mut i, "--person").to_string()),
            "--thumbnails" => search.thumbnails = Some(true),
            "--no-thumbnails" => search.thumbnails = Some(false),
            "--caption" => search.caption = true,
            "--ocr" => search.ocr = true,
            "--metadata" => search.metadata = true,
            "--recursive" | "-r" => search.recursive = true,
            "--json" => search.json = true,
            flag if flag.starts_with('-') && flag.len() > 1 => {
                usage_error(&format!("unknown argument: {}", flag));
            }
            _ => positional.push(args[i].clone()),
        }
        i += 1;
    }

    let command = match positional.first().map(String::as_str) {
        Some("search") => {
            let Some(directory) = positional.get(1) else {
                usage_error("search requires a directory");
            };
            if positional.len() > 2 {
                usage_error("search takes exactly one directory");
            }
            search.directory = PathBuf::from(directory);
            Command::Search(search)
        }
        Some("person") => parse_person(&positional[1..]),
        Some(other) => usage_error(&format!("unknown command: {}", other)),
        None => {
            print_help();
            std::process::exit(2);
        }
    };

    Args {
        config_path,
        command,
    }
}

fn parse_person(args: &[String]) -> Command {
    let name = || match args.get(1) {
        Some(name) => name.clone(),
        None => usage_error("person command requires a NAME"),
    };

    match args.first().map(String::as_str) {
        Some("add") => {
            let images: Vec<PathBuf> = args.iter().skip(2).map(PathBuf::from).collect();
            if images.is_empty() {
                usage_error("person add requires at least one image");
            }
            Command::PersonAdd {
                name: name(),
                images,
            }
        }
        Some("delete") => Command::PersonDelete { name: name() },
        Some("show") => Command::PersonShow { name: name() },
        Some("list") => Command::PersonList,
        Some(other) => usage_error(&format!("unknown person command: {}", other)),
        None => usage_error("person requires one of: add, delete, list, show"),
    }
}

fn print_help() {
    println!(
        r#"facefinder - find photos of people by age, gender and identity

USAGE:
    facefinder [OPTIONS] search <DIR> [SEARCH OPTIONS]
    facefinder [OPTIONS] person add <NAME> <IMAGE>...
    facefinder [OPTIONS] person delete <NAME>
    facefinder [OPTIONS] person list
    facefinder [OPTIONS] person show <NAME>

SEARCH OPTIONS:
    --min-age N         Only faces at least N years old
    --max-age N         Only faces at most N years old
    --male              Only male faces
    --female            Only female faces
    --person, -p NAME   Only faces of this trained reference person
    --thumbnails        Save thumbnails of results (default from config)
    --no-thumbnails     Do not save thumbnails
    --caption           Describe each result
    --ocr               Read the first line of text in each result
    --metadata          Include EXIF date taken and title
    --recursive, -r     Include subdirectories
    --json              Print results as JSON lines

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

PERSON COMMANDS:
    add                 Attach sample images to a person and train it
    delete              Delete a person and all its sample faces
    list                List people created by facefinder
    show                Show a person's sample images (created if absent)

ENVIRONMENT:
    FACEFINDER_CONFIG       Path to config file (overrides default location)
    FACEFINDER_FACE_KEY     Face API key (overrides config)
    FACEFINDER_VISION_KEY   Computer Vision API key (overrides config)
    FACEFINDER_LOG          Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/facefinder/config.toml
Press Ctrl-C during a search to stop after the current image."#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    // Initialize logging (uses journald on Linux, file fallback otherwise)
    let _ = logging::init(Some(Config::config_dir().join("logs")));

    let config = match args.config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    match args.command {
        Command::Search(search) => run_search(&config, search).await,
        Command::PersonAdd { name, images } => person_add(&config, &name, &images).await,
        Command::PersonDelete { name } => person_delete(&config, &name).await,
        Command::PersonList => person_list(&config).await,
        Command::PersonShow { name } => person_show(&config, &name).await,
    }
}

fn reference_manager(config: &Config) -> Result<(Arc<FaceClient>, Arc<ReferenceManager>)> {
    let face = Arc::new(FaceClient::from_config(&config.face)?);
    let references = Arc::new(ReferenceManager::new(
        face.clone(),
        TrainingPolicy::from(&config.training),
    ));
    Ok((face, references))
}

fn criteria(config: &Config, args: &SearchArgs) -> Result<SearchCriteria> {
    let age = match (args.min_age, args.max_age) {
        (None, None) => None,
        (min, max) => Some(AgeRange::new(
            min.unwrap_or(config.search.min_age),
            max.unwrap_or(config.search.max_age),
        )),
    };

    let criteria = SearchCriteria {
        age,
        male_only: args.male,
        female_only: args.female,
    };
    criteria.validate()?;
    Ok(criteria)
}

async fn run_search(config: &Config, args: SearchArgs) -> Result<()> {
    let criteria = criteria(config, &args)?;
    let mut options = SearchOptions::from(&config.search);
    options.thumbnail = args.thumbnails.unwrap_or(options.thumbnail);
    options.caption |= args.caption;
    options.text |= args.ocr;
    options.metadata |= args.metadata;
    options.match_person = args.person.is_some();

    let thumbnails = ThumbnailStore::new(&config.thumbnails);
    let mut scanner_config = config.scanner.clone();
    scanner_config.recursive |= args.recursive;
    let catalog = Scanner::new(scanner_config)
        .skipping(thumbnails.folder_name())
        .scan_directory(&args.directory)?;
    eprintln!(
        "{}: {} files, {} images",
        catalog.directory.display(),
        catalog.file_count,
        catalog.image_count()
    );
    if catalog.is_empty() {
        return Ok(());
    }

    let (face, references) = reference_manager(config)?;
    let vision = Arc::new(VisionClient::from_config(&config.vision)?);

    let subject = match &args.person {
        Some(name) => {
            let Some(subject) = references.locate_or_create(name).await? else {
                bail!("person name is empty");
            };
            if !subject.is_trained() {
                eprintln!(
                    "Warning: '{}' is not trained, results are not checked against it. \
                     Add sample images with 'facefinder person add'.",
                    subject.name()
                );
            }
            Some(subject)
        }
        None => None,
    };

    let pipeline = Pipeline::new(face, vision, references, thumbnails);

    let (mut task, tx) = SearchTask::new();
    let cancel = task.cancel_flag.clone();

    let report = {
        let run = pipeline.run(
            SearchRequest {
                files: &catalog.images,
                criteria,
                options,
                subject: subject.as_ref(),
            },
            &cancel,
            Some(&tx),
        );
        tokio::pin!(run);

        loop {
            tokio::select! {
                report = &mut run => break report,
                Some(update) = task.next_update() => show_update(&update, args.json),
                _ = tokio::signal::ctrl_c(), if !cancel.load(Ordering::SeqCst) => {
                    eprintln!("Stopping after the current image...");
                    cancel.store(true, Ordering::SeqCst);
                }
            }
        }
    };
    drop(tx);
    while let Some(update) = task.next_update().await {
        show_update(&update, args.json);
    }

    let counters = report.counters;
    eprintln!(
        "processed {}, with faces {}, qualifying {}, results {}{} in {:.1?}",
        counters.processed,
        counters.searched,
        counters.qualifying,
        report.records.len(),
        if options.match_person {
            format!(" (matched {})", counters.matched)
        } else {
            String::new()
        },
        task.elapsed()
    );

    match report.outcome {
        RunOutcome::Aborted { file_name, error } => {
            Err(error).with_context(|| format!("search stopped at {}", file_name))
        }
        RunOutcome::Completed | RunOutcome::Cancelled => Ok(()),
    }
}

fn show_update(update: &TaskUpdate, json: bool) {
    match update {
        TaskUpdate::Matched(record) => print_record(record, json),
        TaskUpdate::Progress(progress) => {
            tracing::debug!(
                percent = progress.percent(),
                file = progress.current_item.as_deref().unwrap_or(""),
                "Searching"
            );
        }
        TaskUpdate::Cancelled => eprintln!("Search cancelled"),
        TaskUpdate::Failed { file_name, error } => eprintln!("Failed on {}: {}", file_name, error),
        TaskUpdate::Started { .. } | TaskUpdate::Completed { .. } => {}
    }
}

fn print_record(record: &ImageRecord, json: bool) {
    if json {
        match serde_json::to_string(record) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("Failed to encode {}: {}", record.file_name, e),
        }
        return;
    }

    println!("{}\t{}", record.path.display(), record.attributes);
    if let Some(confidence) = record.confidence {
        println!("    confidence: {:.2}", confidence);
    }
    for (label, value) in [
        ("metadata", &record.metadata),
        ("caption", &record.caption),
        ("text", &record.text),
    ] {
        if !value.is_empty() {
            println!("    {}: {}", label, value);
        }
    }
    if let Some(thumbnail) = record.thumbnail.as_ref().filter(|t| **t != record.path) {
        println!("    thumbnail: {}", thumbnail.display());
    }
}

async fn person_add(config: &Config, name: &str, images: &[PathBuf]) -> Result<()> {
    let images = images
        .iter()
        .map(|p| std::fs::canonicalize(p).with_context(|| format!("Cannot open {}", p.display())))
        .collect::<Result<Vec<_>>>()?;

    let (_, references) = reference_manager(config)?;
    let Some(mut subject) = references.locate_or_create(name).await? else {
        bail!("person name is empty");
    };

    let before = subject.faces().len();
    let trained = references.attach_faces(&mut subject, &images).await?;
    println!(
        "{}: {} new, {} total sample faces, {}",
        subject.name(),
        subject.faces().len() - before,
        subject.faces().len(),
        if trained { "trained" } else { "not trained" }
    );
    Ok(())
}

async fn person_delete(config: &Config, name: &str) -> Result<()> {
    let Some(group_id) = subject_id(name) else {
        bail!("person name is empty");
    };

    let (_, references) = reference_manager(config)?;
    references.delete_subject(&mut None, &group_id).await?;
    println!("Deleted {}", name.trim());
    Ok(())
}

async fn person_list(config: &Config) -> Result<()> {
    let (_, references) = reference_manager(config)?;
    for name in references.list_subjects().await? {
        println!("{}", name);
    }
    Ok(())
}

async fn person_show(config: &Config, name: &str) -> Result<()> {
    let (_, references) = reference_manager(config)?;
    let Some(subject) = references.locate_or_create(name).await? else {
        bail!("person name is empty");
    };

    println!(
        "{} ({}), {}",
        subject.name(),
        subject.group_id(),
        if subject.is_trained() { "trained" } else { "not trained" }
    );
    for face in subject.faces() {
        println!("    {}", face.source.display());
    }
    Ok(())
}
