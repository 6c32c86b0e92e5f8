//! Fixture builders shared by unit tests.

use lopdf::{dictionary, Document, Object, Stream};

use crate::ocr::blocks::{AnalysisOutput, Block, Relationship};
use crate::ocr::{AnalysisState, AnalysisStatus, DocumentAnalysisService, OcrError};

/// Builds a PDF with one page per content stream, Courier as `/F1`.
pub fn pdf_with_pages<S: AsRef<str>>(contents: &[S]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for content in contents {
        let content_id = doc.add_object(Object::Stream(Stream::new(
            dictionary! {},
            content.as_ref().as_bytes().to_vec(),
        )));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Escapes a literal PDF string.
pub fn pdf_string(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

/// A content stream drawing each line 14pt below the previous one.
pub fn text_lines(lines: &[&str]) -> String {
    let mut content = String::from("BT /F1 10 Tf 14 TL 40 760 Td");
    for line in lines {
        content.push_str(&format!(" ({}) Tj T*", pdf_string(line)));
    }
    content.push_str(" ET");
    content
}

/// Page text of a nomination statement for `area`, long enough for the
/// heading to carry the area name.
pub fn sopn_page_lines(area: &str) -> Vec<String> {
    vec![
        format!("Kirklees Council election of councillors for the {} ward", area),
        "Statement of persons nominated notice of poll and situation of polling stations"
            .to_string(),
        "The following is a statement of the persons nominated for election".to_string(),
        "Name of candidate description of candidate names of proposer and seconder".to_string(),
        "SMITH Alice Labour Party Jones Bob Brown Carol".to_string(),
        "TAYLOR Dan Conservative Party White Eve Black Fred".to_string(),
        "GREEN Gail Green Party Gray Hal Blue Ivy".to_string(),
        "WALKER Jo Liberal Democrats Hill Kim Stone Lee".to_string(),
        "The persons above against whose names no entry is made have been validly nominated"
            .to_string(),
    ]
}

/// A content stream for [`sopn_page_lines`].
pub fn sopn_page(area: &str) -> String {
    let lines = sopn_page_lines(area);
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    text_lines(&refs)
}

/// One ruled row per entry, two columns.
pub fn ruled_rows(rows: &[(&str, &str)]) -> String {
    let mut content = String::new();
    let top = 700.0;
    let bottom = top - 20.0 * rows.len() as f32;
    for i in 0..=rows.len() {
        let y = top - 20.0 * i as f32;
        content.push_str(&format!("40 {} m 400 {} l S ", y, y));
    }
    for x in [40.0, 200.0, 400.0] {
        content.push_str(&format!("{} {} m {} {} l S ", x, bottom, x, top));
    }
    for (i, (left, right)) in rows.iter().enumerate() {
        let y = top - 20.0 * i as f32 - 12.0;
        content.push_str(&format!(
            "BT /F1 9 Tf 44 {} Td ({}) Tj ET BT /F1 9 Tf 204 {} Td ({}) Tj ET ",
            y,
            pdf_string(left),
            y,
            pdf_string(right)
        ));
    }
    content
}

/// A nomination statement page for `area`: the opening lines of
/// [`sopn_page_lines`] above a ruled candidate table.
pub fn sopn_table_page(area: &str, rows: &[(&str, &str)]) -> String {
    let lines = sopn_page_lines(area);
    let heading: Vec<&str> = lines.iter().take(3).map(String::as_str).collect();
    format!("{} {}", text_lines(&heading), ruled_rows(rows))
}

/// A document analysis service driven by the test.
///
/// Status requests fail like a dropped connection until a state is set;
/// result requests fail until an output is set.
#[derive(Default)]
pub struct FakeAnalysisService {
    state: std::sync::Mutex<Option<AnalysisState>>,
    output: std::sync::Mutex<Option<AnalysisOutput>>,
    images: std::sync::Mutex<Option<Vec<Vec<u8>>>>,
    submissions: std::sync::Mutex<Vec<Option<Vec<u32>>>>,
}

impl FakeAnalysisService {
    pub fn set_state(&self, state: AnalysisState) {
        *self.state.lock().unwrap() = Some(state);
    }

    pub fn set_output(&self, output: AnalysisOutput) {
        *self.output.lock().unwrap() = Some(output);
    }

    pub fn set_images(&self, images: Vec<Vec<u8>>) {
        *self.images.lock().unwrap() = Some(images);
    }

    /// Page lists of every submission so far.
    pub fn submissions(&self) -> Vec<Option<Vec<u32>>> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DocumentAnalysisService for FakeAnalysisService {
    async fn start_analysis(
        &self,
        _pdf: Vec<u8>,
        pages: Option<&[u32]>,
    ) -> crate::ocr::Result<String> {
        let mut submissions = self.submissions.lock().unwrap();
        submissions.push(pages.map(|p| p.to_vec()));
        Ok(format!("job-{}", submissions.len()))
    }

    async fn analysis_status(&self, _job_id: &str) -> crate::ocr::Result<AnalysisStatus> {
        match *self.state.lock().unwrap() {
            Some(status) => Ok(AnalysisStatus {
                status,
                status_message: None,
            }),
            None => Err(OcrError::InvalidResponse("connection reset".to_string())),
        }
    }

    async fn analysis_result(&self, _job_id: &str) -> crate::ocr::Result<AnalysisOutput> {
        self.output.lock().unwrap().clone().ok_or(OcrError::Status {
            status: 500,
            body: "result unavailable".to_string(),
        })
    }

    async fn page_images(&self, _job_id: &str) -> crate::ocr::Result<Option<Vec<Vec<u8>>>> {
        Ok(self.images.lock().unwrap().clone())
    }
}

/// Recognition output holding one table per page, each given as rows of
/// cell text.
pub fn analysis_output(pages: &[&[&[&str]]]) -> AnalysisOutput {
    let mut blocks = Vec::new();
    let mut next_id = 0;
    let mut id = || {
        next_id += 1;
        format!("b{}", next_id)
    };

    for (page_index, rows) in pages.iter().enumerate() {
        let table_id = id();
        let mut cell_ids = Vec::new();
        let mut children = Vec::new();
        for (r, row) in rows.iter().enumerate() {
            for (c, text) in row.iter().enumerate() {
                let cell_id = id();
                let mut word_ids = Vec::new();
                for word in text.split_whitespace() {
                    let word_id = id();
                    children.push(Block {
                        id: word_id.clone(),
                        block_type: "WORD".to_string(),
                        page: Some(page_index as u32 + 1),
                        text: Some(word.to_string()),
                        row_index: None,
                        column_index: None,
                        row_span: None,
                        column_span: None,
                        relationships: Vec::new(),
                    });
                    word_ids.push(word_id);
                }
                children.push(Block {
                    id: cell_id.clone(),
                    block_type: "CELL".to_string(),
                    page: Some(page_index as u32 + 1),
                    text: None,
                    row_index: Some(r as u32 + 1),
                    column_index: Some(c as u32 + 1),
                    row_span: None,
                    column_span: None,
                    relationships: vec![Relationship {
                        kind: "CHILD".to_string(),
                        ids: word_ids,
                    }],
                });
                cell_ids.push(cell_id);
            }
        }
        blocks.push(Block {
            id: table_id,
            block_type: "TABLE".to_string(),
            page: Some(page_index as u32 + 1),
            text: None,
            row_index: None,
            column_index: None,
            row_span: None,
            column_span: None,
            relationships: vec![Relationship {
                kind: "CHILD".to_string(),
                ids: cell_ids,
            }],
        });
        blocks.extend(children);
    }

    AnalysisOutput { blocks }
}

/// A slice of the GB register with one NI party.
pub fn parties() -> Vec<crate::db::party_repo::PartyRow> {
    [
        ("PP52", "Conservative and Unionist Party", "GB"),
        ("PP53", "Labour Party", "GB"),
        ("PP63", "Green Party", "GB"),
        ("PP85", "UK Independence Party (UKIP)", "GB"),
        ("PP90", "Liberal Democrats", "GB"),
        ("PP77", "Plaid Cymru - The Party of Wales", "GB"),
        ("PP680", "Green Party", "NI"),
        ("ynmp-party:2", "Independent", "GB"),
    ]
    .into_iter()
    .map(|(party_id, name, register)| crate::db::party_repo::PartyRow {
        party_id: party_id.to_string(),
        name: name.to_string(),
        register: register.to_string(),
    })
    .collect()
}

/// Writes [`parties`] and a Labour co-op description to `db`, returning the
/// description id.
pub fn seed_parties(db: &crate::db::Database) -> i64 {
    use crate::db::party_repo;

    for party in parties() {
        party_repo::upsert_party(db, &party).unwrap();
    }
    party_repo::insert_description(db, "PP53", "Labour and Co-operative Party").unwrap()
}
