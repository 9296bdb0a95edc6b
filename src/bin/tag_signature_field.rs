//! Create a one-page PDF with a tagged signature field
//!
//! Builds a signature field widget, tags it under /Document -> /Form through an
//! OBJR, writes the accessibility metadata and saves the result.
//!
//! Usage:
//!   cargo run --bin tag_signature_field
//!   cargo run --bin tag_signature_field -- --output signed.pdf --lang de-DE --dump

use std::path::PathBuf;
use std::process::ExitCode;
use tagged_pdf::catalog::DocumentCatalog;
use tagged_pdf::content::StoredAnnotation;
use tagged_pdf::store::{MemoryStore, ObjectSerializer, ObjectStore};
use tagged_pdf::{Result, StructureBuilder};

struct Config {
    output: PathBuf,
    field_name: String,
    language: String,
    dump: bool,
}

impl Config {
    fn from_args() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut config = Config {
            output: PathBuf::from("tagged_signature_field.pdf"),
            field_name: "Signature1".to_string(),
            language: "en-US".to_string(),
            dump: false,
        };

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--output" | "-o" if i + 1 < args.len() => {
                    config.output = PathBuf::from(&args[i + 1]);
                    i += 1;
                },
                "--field" if i + 1 < args.len() => {
                    config.field_name = args[i + 1].clone();
                    i += 1;
                },
                "--lang" if i + 1 < args.len() => {
                    config.language = args[i + 1].clone();
                    i += 1;
                },
                "--dump" => config.dump = true,
                other => eprintln!("Ignoring unknown argument: {}", other),
            }
            i += 1;
        }
        config
    }
}

fn run(config: &Config) -> Result<()> {
    let mut store = MemoryStore::new();
    let page = store.add_page(612.0, 792.0)?;

    // Signature field merged with its widget annotation
    let widget = store.add(ObjectSerializer::dict(vec![
        ("Type", ObjectSerializer::name("Annot")),
        ("Subtype", ObjectSerializer::name("Widget")),
        ("FT", ObjectSerializer::name("Sig")),
        ("T", ObjectSerializer::text(&config.field_name)),
        ("TU", ObjectSerializer::text("Signature")),
        ("Rect", ObjectSerializer::rect(50.0, 650.0, 200.0, 50.0)),
        ("F", ObjectSerializer::integer(4)),
    ]));
    store.add_annotation(page, widget)?;
    store.register_field(widget)?;

    let mut builder = StructureBuilder::new_document();
    let document = builder.add_top_level_element("Document")?;
    let form = builder.add_element("Form", document)?;

    for widget in store.find_field_widgets(&config.field_name)? {
        let mut item = StoredAnnotation::open(&mut store, widget)?;
        let index = builder.link(&mut item, form)?;
        log::info!("Tagged widget {} with /StructParent {}", widget, index);
    }

    builder.metadata_mut().mark_tagged();
    builder.metadata_mut().set_language(&config.language)?;
    let root = builder.bind_and_finalize(&mut store)?;

    store.save(&config.output)?;
    println!("Wrote {} (StructTreeRoot {})", config.output.display(), root);

    if config.dump {
        let reloaded = StructureBuilder::from_existing(&store)?;
        println!("{}", reloaded.snapshot().to_json()?);
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let config = Config::from_args();
    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        },
    }
}
