use super::formats::{decode_text, docx_paragraphs};
use super::*;
use std::fs;
use std::io::Write;
use tempfile::TempDir;

fn write_docx(path: &Path, paragraphs: &[&str]) {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{}</w:body></w:document>",
        body
    );

    let file = fs::File::create(path).expect("should create docx file");
    let mut writer = zip::ZipWriter::new(file);
    writer
        .start_file(
            "word/document.xml",
            zip::write::SimpleFileOptions::default(),
        )
        .expect("should start zip entry");
    writer
        .write_all(xml.as_bytes())
        .expect("should write document xml");
    writer.finish().expect("should finish docx archive");
}

/// Build a one-page PDF using the standard Helvetica font
fn write_pdf(path: &Path, text: &str) {
    let stream = format!("BT /F1 24 Tf 72 700 Td ({}) Tj ET", text);
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
         /Resources << /Font << /F1 5 0 R >> >> >>"
            .to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            stream.len(),
            stream
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::new();
    for (i, object) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, object));
    }

    let xref_offset = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        pdf.push_str(&format!("{:010} 00000 n \n", offset));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    ));

    fs::write(path, pdf).expect("should write pdf");
}

#[test]
fn format_detection_is_case_insensitive() {
    assert_eq!(
        DocumentFormat::from_path(Path::new("a/README.MD")),
        Some(DocumentFormat::PlainText)
    );
    assert_eq!(
        DocumentFormat::from_path(Path::new("policy.Pdf")),
        Some(DocumentFormat::Pdf)
    );
    assert_eq!(
        DocumentFormat::from_path(Path::new("handbook.docx")),
        Some(DocumentFormat::Docx)
    );
    assert_eq!(
        DocumentFormat::from_path(Path::new("old.doc")),
        Some(DocumentFormat::LegacyDoc)
    );
    assert_eq!(DocumentFormat::from_path(Path::new("image.png")), None);
    assert_eq!(DocumentFormat::from_path(Path::new("Makefile")), None);
}

#[test]
fn plain_text_files_load_with_metadata() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    for name in ["notes.txt", "guide.md", "faq.markdown"] {
        let path = temp_dir.path().join(name);
        fs::write(&path, format!("Content of {}", name)).expect("should write file");

        let document = load_file(&path)
            .expect("should load file")
            .expect("file should produce a document");

        assert_eq!(document.content, format!("Content of {}", name));
        assert_eq!(document.metadata.filename, name);
        assert_eq!(document.metadata.source, path.display().to_string());
    }
}

#[test]
fn gbk_text_is_decoded() {
    let (encoded, _, had_errors) = encoding_rs::GBK.encode("年假天数为五天");
    assert!(!had_errors);

    let text = decode_text(encoded.into_owned()).expect("gbk text should decode");

    assert_eq!(text, "年假天数为五天");
}

#[test]
fn utf8_bom_is_stripped() {
    let text = decode_text("\u{feff}hello".as_bytes().to_vec()).expect("should decode");
    assert_eq!(text, "hello");
}

#[test]
fn docx_paragraphs_are_joined() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("handbook.docx");
    write_docx(&path, &["Leave policy", "  ", "Annual leave is 5 days &amp; more"]);

    let document = load_file(&path)
        .expect("should load docx")
        .expect("docx should produce a document");

    assert_eq!(
        document.content,
        "Leave policy\n\nAnnual leave is 5 days & more"
    );
    assert_eq!(document.metadata.filename, "handbook.docx");
}

#[test]
fn docx_xml_handles_tabs_and_breaks() {
    let xml = "<w:document xmlns:w=\"urn:w\"><w:body>\
               <w:p><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t><w:br/><w:t>c</w:t></w:r></w:p>\
               </w:body></w:document>";

    let paragraphs = docx_paragraphs(xml).expect("xml should parse");

    assert_eq!(paragraphs, vec!["a\tb\nc".to_string()]);
}

#[test]
fn pdf_text_is_extracted() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("memo.pdf");
    write_pdf(&path, "Hello PDF world");

    let document = load_file(&path)
        .expect("should load pdf")
        .expect("pdf should produce a document");

    assert!(document.content.contains("Hello"));
    assert_eq!(document.metadata.filename, "memo.pdf");
}

#[test]
fn empty_files_produce_no_document() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("blank.txt");
    fs::write(&path, "  \n\t\n").expect("should write file");

    assert_eq!(load_file(&path).expect("should read file"), None);
}

#[test]
fn legacy_doc_is_reported_unsupported() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("old.doc");
    fs::write(&path, b"\xd0\xcf\x11\xe0binary").expect("should write file");

    assert!(matches!(load_file(&path), Err(LoaderError::Unsupported(_))));
}

#[test]
fn directory_load_skips_bad_files() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let root = temp_dir.path();
    let nested = root.join("hr").join("policies");
    fs::create_dir_all(&nested).expect("should create nested dirs");

    fs::write(root.join("a.txt"), "First document").expect("should write");
    fs::write(nested.join("b.md"), "# Second\n\nNested document").expect("should write");
    fs::write(root.join("broken.pdf"), "definitely not a pdf").expect("should write");
    fs::write(root.join("broken.docx"), "not a zip archive").expect("should write");
    fs::write(root.join("empty.txt"), "").expect("should write");
    fs::write(root.join("image.png"), [0x89, 0x50, 0x4e, 0x47]).expect("should write");
    fs::write(root.join("legacy.doc"), "binary").expect("should write");

    let documents = load_documents_from_directory(root);

    let filenames: Vec<&str> = documents
        .iter()
        .map(|d| d.metadata.filename.as_str())
        .collect();
    assert_eq!(filenames, vec!["a.txt", "b.md"]);
    assert!(documents[1].metadata.source.contains("policies"));
}

#[test]
fn missing_directory_yields_nothing() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let documents = load_documents_from_directory(&temp_dir.path().join("missing"));
    assert!(documents.is_empty());
}
