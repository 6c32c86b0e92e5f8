//! Builders for test documents and register data.

#![allow(dead_code)]

use lopdf::{dictionary, Document, Object, Stream};

use sopn::db::ballot_repo::BallotRow;
use sopn::db::party_repo::PartyRow;

/// Builder for `BallotRow` instances.
pub struct BallotBuilder {
    ballot: BallotRow,
}

impl BallotBuilder {
    /// A current, unlocked GB ballot.
    pub fn new(ballot_paper_id: &str, post_label: &str) -> Self {
        Self {
            ballot: BallotRow {
                ballot_paper_id: ballot_paper_id.to_string(),
                election_slug: "local.kirklees.2024-05-02".to_string(),
                post_label: post_label.to_string(),
                party_register: "GB".to_string(),
                is_welsh_run: false,
                election_current: true,
                candidates_locked: false,
                created_at: String::new(),
            },
        }
    }

    pub fn election(mut self, slug: &str) -> Self {
        self.ballot.election_slug = slug.to_string();
        self
    }

    pub fn register(mut self, register: &str) -> Self {
        self.ballot.party_register = register.to_string();
        self
    }

    pub fn welsh_run(mut self) -> Self {
        self.ballot.is_welsh_run = true;
        self
    }

    pub fn past(mut self) -> Self {
        self.ballot.election_current = false;
        self
    }

    pub fn locked(mut self) -> Self {
        self.ballot.candidates_locked = true;
        self
    }

    pub fn build(self) -> BallotRow {
        self.ballot
    }
}

/// The registered parties every harness starts with.
pub fn register() -> Vec<PartyRow> {
    [
        ("PP52", "Conservative and Unionist Party", "GB"),
        ("PP53", "Labour Party", "GB"),
        ("PP63", "Green Party", "GB"),
        ("PP90", "Liberal Democrats", "GB"),
        ("PP77", "Plaid Cymru - The Party of Wales", "GB"),
        ("ynmp-party:2", "Independent", "GB"),
    ]
    .into_iter()
    .map(|(party_id, name, register)| PartyRow {
        party_id: party_id.to_string(),
        name: name.to_string(),
        register: register.to_string(),
    })
    .collect()
}

/// Builds a PDF with one page per content stream, Courier as `/F1`.
pub fn pdf(pages: &[String]) -> Vec<u8> {
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
    for content in pages {
        let content_id = doc.add_object(Object::Stream(Stream::new(
            dictionary! {},
            content.as_bytes().to_vec(),
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
    doc.save_to(&mut bytes).expect("Failed to write PDF");
    bytes
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

/// Builder for one page of a nomination statement: a heading naming the
/// ward above a ruled two-column candidate table.
pub struct SopnPageBuilder {
    area: String,
    rows: Vec<(String, String)>,
}

impl SopnPageBuilder {
    pub fn new(area: &str) -> Self {
        Self {
            area: area.to_string(),
            rows: Vec::new(),
        }
    }

    /// Adds the `Name of candidate | Description` header row.
    pub fn header(self) -> Self {
        self.row("Name of candidate", "Description")
    }

    pub fn row(mut self, name: &str, description: &str) -> Self {
        self.rows.push((name.to_string(), description.to_string()));
        self
    }

    pub fn build(self) -> String {
        let heading = [
            format!(
                "Kirklees Council election of councillors for the {} ward",
                self.area
            ),
            "Statement of persons nominated notice of poll and situation of polling stations"
                .to_string(),
            "The following is a statement of the persons nominated for election".to_string(),
        ];
        let mut content = String::from("BT /F1 10 Tf 14 TL 40 760 Td");
        for line in &heading {
            content.push_str(&format!(" ({}) Tj T*", escape(line)));
        }
        content.push_str(" ET ");

        let top = 700.0;
        let bottom = top - 20.0 * self.rows.len() as f32;
        for i in 0..=self.rows.len() {
            let y = top - 20.0 * i as f32;
            content.push_str(&format!("40 {} m 400 {} l S ", y, y));
        }
        for x in [40.0, 200.0, 400.0] {
            content.push_str(&format!("{} {} m {} {} l S ", x, bottom, x, top));
        }
        for (i, (left, right)) in self.rows.iter().enumerate() {
            let y = top - 20.0 * i as f32 - 12.0;
            content.push_str(&format!(
                "BT /F1 9 Tf 44 {} Td ({}) Tj ET BT /F1 9 Tf 204 {} Td ({}) Tj ET ",
                y,
                escape(left),
                y,
                escape(right)
            ));
        }
        content
    }
}

/// A page with no text layer, as a scanner produces.
pub fn scanned_page() -> String {
    "q 612 0 0 792 0 0 cm Q".to_string()
}
