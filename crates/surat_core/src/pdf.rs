//! A4 rendering of an approved letter. Long attribute values continue onto
//! further pages.

use anyhow::anyhow;
use lopdf::{
    content::{Content, Operation},
    dictionary, Document, Object, Stream,
};

use crate::{error::SuratError, types::SubmissionDetail};

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN_LEFT: i64 = 60;
const TOP: i64 = 770;
const BOTTOM: i64 = 60;
const LINE_HEIGHT: i64 = 16;
const WRAP_COLUMNS: usize = 85;

/// One line of output: font resource, size, text.
struct Line {
    font: &'static str,
    size: i64,
    text: String,
}

impl Line {
    fn body(text: impl Into<String>) -> Self {
        Self {
            font: "F1",
            size: 11,
            text: text.into(),
        }
    }

    fn heading(text: impl Into<String>) -> Self {
        Self {
            font: "F2",
            size: 14,
            text: text.into(),
        }
    }
}

fn letter_lines(detail: &SubmissionDetail) -> Vec<Line> {
    let submission = &detail.submission;
    let mut lines = vec![
        Line::heading(detail.letter_type.name.to_uppercase()),
        Line::body(format!(
            "Nomor: {}",
            submission.letter_number.as_deref().unwrap_or("-")
        )),
        Line::body(""),
        Line::body("Yang bertanda tangan di bawah ini menerangkan bahwa:"),
        Line::body(format!("Nama    : {}", detail.resident.name)),
        Line::body(format!("NIK     : {}", detail.resident.nik)),
        Line::body(format!(
            "Alamat  : {}",
            detail.resident.address.as_deref().unwrap_or("-")
        )),
        Line::body(""),
    ];

    for view in &detail.attributes {
        let mut text = format!(
            "{}: {}",
            view.definition.name,
            view.value.as_deref().unwrap_or("-")
        );
        if !view.file_paths.is_empty() {
            text.push_str(&format!(" ({} lampiran)", view.file_paths.len()));
        }
        lines.extend(wrap(&text, WRAP_COLUMNS).into_iter().map(Line::body));
    }

    lines.push(Line::body(""));
    if let Some(approved) = submission.approval_date {
        lines.push(Line::body(format!(
            "Disetujui pada {}",
            approved.format("%d-%m-%Y")
        )));
    }
    lines.push(Line::body(format!(
        "Tanda tangan: {}",
        submission.signature_path.as_deref().unwrap_or("-")
    )));
    lines
}

/// Greedy word wrap on character count.
fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = if current.is_empty() { 0 } else { 1 } + word.chars().count();
        if !current.is_empty() && current.chars().count() + needed > columns {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || out.is_empty() {
        out.push(current);
    }
    out
}

/// The standard fonts are WinAnsi encoded; anything outside Latin-1 becomes `?`.
fn latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Split lines into pages so no baseline drops below `BOTTOM`.
fn paginate(lines: Vec<Line>) -> Vec<Vec<Line>> {
    let per_page = ((TOP - BOTTOM) / LINE_HEIGHT + 1) as usize;
    let mut pages = Vec::new();
    let mut lines = lines.into_iter().peekable();
    while lines.peek().is_some() {
        pages.push(lines.by_ref().take(per_page).collect());
    }
    if pages.is_empty() {
        pages.push(Vec::new());
    }
    pages
}

fn page_content(lines: &[Line]) -> Content {
    let mut operations = Vec::new();
    let mut y = TOP;
    for line in lines {
        if !line.text.is_empty() {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new(
                "Tf",
                vec![line.font.into(), line.size.into()],
            ));
            operations.push(Operation::new("Td", vec![MARGIN_LEFT.into(), y.into()]));
            operations.push(Operation::new(
                "Tj",
                vec![Object::string_literal(latin1(&line.text))],
            ));
            operations.push(Operation::new("ET", vec![]));
        }
        y -= LINE_HEIGHT;
    }
    Content { operations }
}

pub fn render_letter_pdf(detail: &SubmissionDetail) -> Result<Vec<u8>, SuratError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
        },
    });

    let mut kids = Vec::new();
    for page_lines in paginate(letter_lines(detail)) {
        let content = page_content(&page_lines)
            .encode()
            .map_err(|e| anyhow!("encode letter content: {e}"))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::from(page_id));
    }
    let count = kids.len() as i64;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| anyhow!("write letter pdf: {e}"))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn detail() -> SubmissionDetail {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
        let letter_type = LetterType {
            id: Uuid::new_v4(),
            name: "Surat Keterangan Domisili".into(),
            code: "SKD".into(),
            description: None,
            created_at: now,
            updated_at: now,
        };
        let definition = AttributeDefinition {
            id: Uuid::new_v4(),
            letter_type_id: letter_type.id,
            name: "Keperluan".into(),
            data_type: AttributeDataType::Text,
            options: vec![],
            is_required: true,
            attachment_label: None,
            min_attachment_count: 0,
            is_attachment_required: false,
            display_order: 0,
        };
        SubmissionDetail {
            submission: Submission {
                id: Uuid::new_v4(),
                letter_type_id: letter_type.id,
                resident_id: Uuid::new_v4(),
                submission_date: now,
                status: SubmissionStatus::Approved,
                letter_number: Some("007/SKD/X/2026".into()),
                approval_date: Some(now),
                rejection_reason: None,
                approver_user_id: Some(Uuid::new_v4()),
                signature_path: Some("ttd/u/abc.png".into()),
                created_by: Uuid::new_v4(),
                created_at: now,
                updated_at: now,
            },
            letter_type,
            resident: Resident {
                id: Uuid::new_v4(),
                user_id: None,
                nik: "3201010101010001".into(),
                name: "Siti Aminah".into(),
                address: Some("Dusun Krajan RT 01/RW 02".into()),
            },
            attributes: vec![AttributeValueView {
                definition,
                value: Some("Melamar kerja".into()),
                file_paths: vec![],
            }],
        }
    }

    fn contains(haystack: &[u8], needle: &str) -> bool {
        haystack
            .windows(needle.len())
            .any(|w| w == needle.as_bytes())
    }

    #[test]
    fn renders_single_page_with_letter_fields() {
        let bytes = render_letter_pdf(&detail()).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        assert!(contains(&bytes, "007/SKD/X/2026"));
        assert!(contains(&bytes, "Melamar kerja"));
        assert!(contains(&bytes, "3201010101010001"));
    }

    #[test]
    fn long_values_continue_on_next_page() {
        let mut long = detail();
        long.attributes[0].value = Some("kata ".repeat(1500));
        let bytes = render_letter_pdf(&long).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert!(pages.len() >= 2);

        let mut last_text = Vec::new();
        for page_id in pages.values() {
            let raw = doc.get_page_content(*page_id).unwrap();
            let content = Content::decode(&raw).unwrap();
            for op in content.operations.iter().filter(|op| op.operator == "Td") {
                let y = op.operands[1].as_i64().unwrap();
                assert!(y >= BOTTOM, "baseline {y} below the bottom margin");
            }
            last_text = raw;
        }
        assert!(contains(&last_text, "Tanda tangan"));
        assert!(contains(&last_text, "Disetujui pada"));
    }

    #[test]
    fn paginate_fills_pages_in_order() {
        let per_page = ((TOP - BOTTOM) / LINE_HEIGHT + 1) as usize;
        let lines = (0..per_page + 1).map(|i| Line::body(i.to_string())).collect();
        let pages = paginate(lines);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].len(), per_page);
        assert_eq!(pages[1][0].text, per_page.to_string());
        assert_eq!(paginate(Vec::new()).len(), 1);
    }

    #[test]
    fn wrap_splits_long_text() {
        let text = "kata ".repeat(40);
        let lines = wrap(&text, 20);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.chars().count() <= 20));
        assert_eq!(wrap("", 20), vec![String::new()]);
    }

    #[test]
    fn latin1_replaces_wide_chars() {
        assert_eq!(latin1("Café ✓"), b"Caf\xe9 ?".to_vec());
    }
}
