//! End-to-end filter catalog and chain-resolution tests.
//!
//! Descriptor files are written to temporary directories and consumed
//! through the public catalog API, the way an embedding print system
//! would use the crate.

use platen::filter::{FilterCatalog, FilterDescriptor, auto_chain, chain_command, insert_filter};
use std::fs;
use std::path::Path;
use std::time::Duration;

fn write_filter(dir: &Path, id: &str, body: &str) {
    fs::write(dir.join(format!("{id}.filter")), body).unwrap();
}

fn ascii_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_filter(
        dir.path(),
        "enscript",
        "Name=enscript\n\
         Comment=Text to PostScript converter\n\
         MimeTypeIn=text/plain\n\
         MimeTypeOut=application/postscript\n\
         Command=enscript -o -\n",
    );
    write_filter(
        dir.path(),
        "ps2pdf",
        "Name=ps2pdf\n\
         Comment=PostScript to PDF converter\n\
         MimeTypeIn=application/postscript\n\
         MimeTypeOut=application/pdf\n\
         Command=ps2pdf - -\n",
    );
    write_filter(
        dir.path(),
        "texttopdf",
        "Name=texttopdf\n\
         Comment=Direct text to PDF converter\n\
         MimeTypeIn=text/plain\n\
         MimeTypeOut=application/pdf\n\
         Command=texttopdf\n",
    );
    dir
}

#[test]
fn test_scan_finds_descriptor_files() {
    let dir = ascii_dir();
    // A stray non-descriptor file is ignored.
    fs::write(dir.path().join("README"), "not a filter").unwrap();

    let catalog = FilterCatalog::new([dir.path()]);
    let ids: Vec<String> = catalog.list().into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec!["enscript", "ps2pdf", "texttopdf"]);

    let enscript = catalog.get("enscript").unwrap();
    assert_eq!(enscript.name, "enscript");
    assert_eq!(enscript.description, "Text to PostScript converter");
    assert_eq!(enscript.inputs, vec!["text/plain"]);
    assert_eq!(enscript.output, "application/postscript");
}

#[test]
fn test_first_directory_wins_on_duplicate_id() {
    let high = tempfile::tempdir().unwrap();
    let low = tempfile::tempdir().unwrap();
    write_filter(
        high.path(),
        "ps2pdf",
        "Name=site ps2pdf\nMimeTypeIn=application/postscript\nMimeTypeOut=application/pdf\n",
    );
    write_filter(
        low.path(),
        "ps2pdf",
        "Name=stock ps2pdf\nMimeTypeIn=application/postscript\nMimeTypeOut=application/pdf\n",
    );

    let catalog = FilterCatalog::new([high.path(), low.path()]);
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.get("ps2pdf").unwrap().name, "site ps2pdf");
}

#[test]
fn test_malformed_descriptor_skipped_not_fatal() {
    let dir = ascii_dir();
    // No MimeTypeOut: the file is skipped, the rest of the directory loads.
    write_filter(dir.path(), "broken", "Name=broken\nMimeTypeIn=text/plain\n");

    let catalog = FilterCatalog::new([dir.path()]);
    assert_eq!(catalog.len(), 3);
    assert!(catalog.get("broken").is_none());
}

#[test]
fn test_invalidate_picks_up_new_files() {
    let dir = ascii_dir();
    let catalog = FilterCatalog::new([dir.path()]);
    assert_eq!(catalog.len(), 3);

    write_filter(
        dir.path(),
        "pdfopt",
        "Name=pdfopt\nMimeTypeIn=application/pdf\nMimeTypeOut=application/pdf\nCommand=pdfopt - -\n",
    );
    // The scan is cached until invalidated.
    assert_eq!(catalog.len(), 3);
    catalog.invalidate();
    assert_eq!(catalog.len(), 4);
}

#[test]
fn test_direct_chain_preferred_over_composed() {
    let dir = ascii_dir();
    let catalog = FilterCatalog::new([dir.path()]);

    // Both ["enscript", "ps2pdf"] and ["texttopdf"] produce PDF from text;
    // the direct converter wins.
    let chain = auto_chain(&catalog, "text/plain", "application/pdf");
    assert_eq!(chain, vec!["texttopdf"]);
}

#[test]
fn test_composed_chain_when_no_direct_converter() {
    let dir = ascii_dir();
    fs::remove_file(dir.path().join("texttopdf.filter")).unwrap();
    let catalog = FilterCatalog::new([dir.path()]);

    let chain = auto_chain(&catalog, "text/plain", "application/pdf");
    assert_eq!(chain, vec!["enscript", "ps2pdf"]);
}

#[test]
fn test_unreachable_target_yields_empty_chain() {
    let dir = ascii_dir();
    let catalog = FilterCatalog::new([dir.path()]);

    assert!(auto_chain(&catalog, "image/png", "application/pdf").is_empty());
    assert!(auto_chain(&catalog, "text/plain", "text/plain").is_empty());
}

#[test]
fn test_chain_command_joins_templates() {
    let dir = ascii_dir();
    let catalog = FilterCatalog::new([dir.path()]);

    let chain = auto_chain(&catalog, "text/plain", "application/postscript");
    assert_eq!(chain, vec!["enscript"]);
    assert_eq!(chain_command(&catalog, &chain).as_deref(), Some("enscript -o -"));

    let composed = vec!["enscript".to_string(), "ps2pdf".to_string()];
    assert_eq!(
        chain_command(&catalog, &composed).as_deref(),
        Some("enscript -o - | ps2pdf - -")
    );
}

#[test]
fn test_insert_into_running_chain() {
    let dir = ascii_dir();
    write_filter(
        dir.path(),
        "psselect",
        "Name=psselect\n\
         MimeTypeIn=application/postscript\n\
         MimeTypeOut=application/postscript\n\
         Command=psselect\n",
    );
    let catalog = FilterCatalog::new([dir.path()]);

    // psselect consumes and produces PostScript, so it slots between the
    // text converter and the PDF converter.
    let mut list = vec!["enscript".to_string(), "ps2pdf".to_string()];
    let pos = insert_filter(&catalog, &mut list, "psselect", false);
    assert_eq!(pos, Some(1));
    assert_eq!(list, vec!["enscript", "psselect", "ps2pdf"]);
}

#[test]
fn test_insert_rejects_incompatible_filter() {
    let dir = ascii_dir();
    write_filter(
        dir.path(),
        "pngconv",
        "Name=pngconv\nMimeTypeIn=image/png\nMimeTypeOut=application/pdf\n",
    );
    let catalog = FilterCatalog::new([dir.path()]);

    let mut list = vec!["enscript".to_string(), "ps2pdf".to_string()];
    let pos = insert_filter(&catalog, &mut list, "pngconv", false);
    assert_eq!(pos, None);
    assert_eq!(list, vec!["enscript", "ps2pdf"]);
}

#[test]
fn test_requirements_gate_on_disk_filters() {
    let present = tempfile::tempdir().unwrap();
    let marker = present.path().join("marker.conf");
    fs::write(&marker, "").unwrap();

    let dir = tempfile::tempdir().unwrap();
    write_filter(
        dir.path(),
        "gated",
        &format!(
            "Name=gated\n\
             MimeTypeIn=text/plain\n\
             MimeTypeOut=application/postscript\n\
             Require=file:{}\n",
            marker.display()
        ),
    );
    write_filter(
        dir.path(),
        "blocked",
        "Name=blocked\n\
         MimeTypeIn=text/plain\n\
         MimeTypeOut=application/postscript\n\
         Require=file:/nonexistent/platen-test-marker\n",
    );
    write_filter(
        dir.path(),
        "garbled",
        "Name=garbled\n\
         MimeTypeIn=text/plain\n\
         MimeTypeOut=application/postscript\n\
         Require=floppy:/dev/fd0\n",
    );

    let mut catalog = FilterCatalog::new([dir.path()]);
    catalog.set_connect_timeout(Duration::from_millis(50));

    assert!(catalog.requirements_satisfied(&catalog.get("gated").unwrap()));
    assert!(!catalog.requirements_satisfied(&catalog.get("blocked").unwrap()));
    // An unparsable requirement fails closed.
    assert!(!catalog.requirements_satisfied(&catalog.get("garbled").unwrap()));
}

#[test]
fn test_in_memory_catalog_matches_on_disk_behavior() {
    let catalog = FilterCatalog::from_descriptors([
        FilterDescriptor::new("enscript", ["text/plain"], "application/postscript"),
        FilterDescriptor::new("ps2pdf", ["application/postscript"], "application/pdf"),
    ]);

    let chain = auto_chain(&catalog, "text/plain", "application/pdf");
    assert_eq!(chain, vec!["enscript", "ps2pdf"]);
}
