// Command line front end for the document understanding pipeline.

use std::path::PathBuf;
use std::process;

use clap::Parser;

use parakh::models::{BatchResult, DocumentType, OcrEngineKind, ProcessingStatus};
use parakh::pipeline::{BatchRequest, Pipeline, PipelineConfig, ProcessingRequest};

#[derive(Parser)]
#[command(
    name = "parakh",
    about = "Classify, read and validate scanned academic and identity documents"
)]
struct Args {
    /// Image files to process as one batch
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Comma-separated OCR engines to enable, in priority order
    /// (tesseract, leptess, ocrs)
    #[arg(long, default_value = "tesseract,ocrs")]
    engines: String,

    /// Trust this document type for every input instead of classifying
    #[arg(long)]
    type_hint: Option<String>,

    /// Skip cross-document validation for the batch
    #[arg(long)]
    no_cross_validate: bool,

    /// Print the full batch result as JSON instead of a report
    #[arg(long)]
    json: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let engines: Vec<OcrEngineKind> = args
        .engines
        .split(',')
        .filter_map(|name| {
            let parsed = OcrEngineKind::from_name(name);
            if parsed.is_none() {
                eprintln!("Unknown OCR engine '{}', ignoring", name.trim());
            }
            parsed
        })
        .collect();
    if engines.is_empty() {
        eprintln!("No usable OCR engines configured");
        process::exit(1);
    }

    let type_hint = match args.type_hint.as_deref().map(parse_document_type) {
        Some(Ok(document_type)) => Some(document_type),
        Some(Err(value)) => {
            eprintln!("Unknown document type '{}'", value);
            process::exit(1);
        }
        None => None,
    };

    let config = PipelineConfig {
        engines,
        ..PipelineConfig::default()
    };

    let pipeline = match Pipeline::new(config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("Failed to initialize pipeline: {}", e);
            process::exit(1);
        }
    };

    let documents: Vec<ProcessingRequest> = args
        .images
        .iter()
        .map(|path| {
            let mut request = ProcessingRequest::from_path(path);
            request.type_hint = type_hint;
            request
        })
        .collect();

    let batch = pipeline.process_batch(&BatchRequest {
        documents,
        cross_validate: !args.no_cross_validate,
    });

    if args.json {
        match serde_json::to_string_pretty(&batch) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to serialize result: {}", e);
                process::exit(1);
            }
        }
    } else {
        print_batch_report(&batch);
    }

    let stats = pipeline.stats();
    println!(
        "\nProcessed {} document(s), {} successful, {} failed, {:.2}s average",
        stats.documents_processed,
        stats.successful_extractions,
        stats.failed_extractions,
        stats.average_processing_time
    );

    let any_failed = batch
        .results
        .iter()
        .any(|r| r.status == ProcessingStatus::Failed);
    if any_failed {
        process::exit(2);
    }
}

fn parse_document_type(value: &str) -> Result<DocumentType, String> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_lowercase()))
        .map_err(|_| value.to_string())
}

// Print a human-readable report for the whole batch
fn print_batch_report(batch: &BatchResult) {
    println!("===============================================");
    println!("        DOCUMENT PROCESSING REPORT");
    println!("===============================================");
    println!("Batch: {}", batch.batch_id);

    for result in &batch.results {
        println!("\n-----------------------------------------------");
        println!("Document: {}", result.file_name);
        println!("  Status: {:?}", result.status);

        if let Some(error) = &result.error_message {
            println!("  Error: {}", error);
            continue;
        }

        if let Some(ocr) = &result.ocr {
            println!(
                "  OCR: {} (confidence {:.3}, {} chars)",
                ocr.engine,
                ocr.confidence,
                ocr.text.len()
            );
        }
        if let Some(classification) = &result.classification {
            println!(
                "  Type: {} (confidence {:.3})",
                classification.document_type, classification.confidence
            );
        }
        if let Some(extraction) = &result.extraction {
            println!(
                "  Entities ({}, confidence {:.3}):",
                extraction.entities.len(),
                extraction.confidence
            );
            for (field, value) in &extraction.entities {
                println!("    {}: {:?}", field, value);
            }
        }
        if let Some(validation) = &result.validation {
            println!(
                "  Validation: {}",
                if validation.is_valid { "PASSED" } else { "FAILED" }
            );
            for error in &validation.errors {
                println!("    error: {}", error);
            }
            for warning in &validation.warnings {
                println!("    warning: {}", warning);
            }
        }
        println!("  Time: {:.2}s", result.total_processing_time);
    }

    if let Some(cross) = &batch.cross_validation {
        println!("\n-----------------------------------------------");
        println!(
            "Cross-document validation: {} (confidence {:.3})",
            if cross.is_valid { "PASSED" } else { "FAILED" },
            cross.confidence
        );
        for error in &cross.errors {
            println!("  error: {}", error);
        }
        for warning in &cross.warnings {
            println!("  warning: {}", warning);
        }
    }
}
