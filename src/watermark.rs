//! PDF watermarking.
//!
//! The first page of a template PDF is imported into the submitted document
//! once, as a form XObject, and drawn on top of every page. Each page keeps
//! its own content untouched inside a `q ... Q` pair, so the page count and
//! page order of the source document are preserved.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, TextItem,
};
use tracing::{debug, info, instrument, warn};

use crate::error::WatermarkError;

const XOBJECT_PREFIX: &str = "OrWatermark";
/// A4 in points, used when a page carries no usable /MediaBox.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 595.0, 842.0];
/// Bound on /Parent hops when looking up inherited page attributes.
const MAX_TREE_DEPTH: usize = 32;

/// A loaded watermark template. Clones share the parsed template.
#[derive(Clone)]
pub struct Watermark {
    template: Arc<Document>,
}

struct ImportedForm {
    id: ObjectId,
    bbox: [f32; 4],
}

impl Watermark {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WatermarkError> {
        let bytes = std::fs::read(path.as_ref())?;
        let watermark = Self::from_bytes(&bytes)?;
        info!("Loaded watermark template");
        Ok(watermark)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, WatermarkError> {
        let template =
            Document::load_mem(data).map_err(|e| WatermarkError::Parse(e.to_string()))?;
        if template.get_pages().is_empty() {
            return Err(WatermarkError::EmptyTemplate);
        }
        Ok(Self {
            template: Arc::new(template),
        })
    }

    /// Stamp every page of `source` and return the serialised result.
    #[instrument(skip_all, fields(bytes_len = source.len()))]
    pub fn apply(&self, source: &[u8]) -> Result<Vec<u8>, WatermarkError> {
        let mut doc =
            Document::load_mem(source).map_err(|e| WatermarkError::Parse(e.to_string()))?;
        let pages = doc.get_pages();
        let form = self.import_form(&mut doc)?;

        for (number, page_id) in &pages {
            stamp_page(&mut doc, *page_id, &form)?;
            debug!(page = number, "Stamped page");
        }

        let mut output = Vec::new();
        doc.save_to(&mut output)
            .map_err(|e| WatermarkError::Save(e.to_string()))?;

        debug!(pages = pages.len(), output_bytes = output.len(), "Watermark applied");
        Ok(output)
    }

    /// Copy the template's first page into `target` as a form XObject.
    fn import_form(&self, target: &mut Document) -> Result<ImportedForm, WatermarkError> {
        let pages = self.template.get_pages();
        let page_id = *pages.values().next().ok_or(WatermarkError::EmptyTemplate)?;

        let content = self
            .template
            .get_page_content(page_id)
            .map_err(|e| WatermarkError::Page(e.to_string()))?;
        let bbox = media_box(&self.template, page_id);

        let mut memo = HashMap::new();
        let resources = match inherited(&self.template, page_id, b"Resources") {
            Some(resources) => deep_copy(&self.template, target, resources, &mut memo)?,
            None => Object::Dictionary(Dictionary::new()),
        };

        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Form".to_vec()));
        dict.set(
            "BBox",
            Object::Array(bbox.iter().map(|v| Object::from(*v)).collect()),
        );
        dict.set("Resources", resources);

        let id = target.add_object(Stream::new(dict, content));
        Ok(ImportedForm { id, bbox })
    }
}

/// Wrap the page's content in `q ... Q` and draw the form scaled to the page.
fn stamp_page(
    doc: &mut Document,
    page_id: ObjectId,
    form: &ImportedForm,
) -> Result<(), WatermarkError> {
    let page_box = media_box(doc, page_id);

    let mut resources = match inherited(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };
    let mut xobjects = match resources.get(b"XObject").ok().and_then(|o| resolve(doc, o)) {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };
    let name = unused_name(&xobjects);
    xobjects.set(name.clone(), Object::Reference(form.id));
    resources.set("XObject", Object::Dictionary(xobjects));

    let existing = existing_contents(doc, page_id)?;
    let ops = overlay_ops(&name, page_box, form.bbox);

    let prefix = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let suffix = doc.add_object(Stream::new(Dictionary::new(), ops.into_bytes()));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(prefix));
    contents.extend(existing);
    contents.push(Object::Reference(suffix));

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| WatermarkError::Page(format!("page {page_id:?}: {e}")))?;
    page.set("Contents", Object::Array(contents));
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}

fn existing_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>, WatermarkError> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| WatermarkError::Page(format!("page {page_id:?}: {e}")))?;
    Ok(match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    })
}

fn overlay_ops(name: &str, page: [f32; 4], form: [f32; 4]) -> String {
    let scale = |page_len: f32, form_len: f32| {
        if form_len.abs() > f32::EPSILON {
            page_len / form_len
        } else {
            1.0
        }
    };
    let sx = scale(page[2] - page[0], form[2] - form[0]);
    let sy = scale(page[3] - page[1], form[3] - form[1]);
    let tx = page[0] - form[0] * sx;
    let ty = page[1] - form[1] * sy;
    format!("Q\nq\n{sx:.4} 0 0 {sy:.4} {tx:.4} {ty:.4} cm\n/{name} Do\nQ\n")
}

fn unused_name(xobjects: &Dictionary) -> String {
    let mut n = 0usize;
    loop {
        let candidate = format!("{XOBJECT_PREFIX}{n}");
        if !xobjects.has(candidate.as_bytes()) {
            return candidate;
        }
        n += 1;
    }
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Look up a page attribute, following /Parent for inheritable keys.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return resolve(doc, value);
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let Some(Object::Array(items)) = inherited(doc, page_id, b"MediaBox") else {
        return DEFAULT_MEDIA_BOX;
    };
    let values: Vec<f32> = items
        .iter()
        .filter_map(|item| resolve(doc, item).and_then(number))
        .collect();
    match values.as_slice() {
        [x0, y0, x1, y1] => [*x0, *y0, *x1, *y1],
        _ => DEFAULT_MEDIA_BOX,
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Copy `object` and everything it references from `source` into `target`.
///
/// /Parent links are dropped. Each source object is copied at most once.
fn deep_copy(
    source: &Document,
    target: &mut Document,
    object: &Object,
    memo: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Object, WatermarkError> {
    Ok(match object {
        Object::Reference(id) => {
            if let Some(copied) = memo.get(id) {
                return Ok(Object::Reference(*copied));
            }
            let Ok(referenced) = source.get_object(*id) else {
                warn!(reference = ?id, "Dangling reference in watermark template, using null");
                return Ok(Object::Null);
            };
            let new_id = target.new_object_id();
            memo.insert(*id, new_id);
            let copied = deep_copy(source, target, referenced, memo)?;
            target.objects.insert(new_id, copied);
            Object::Reference(new_id)
        }
        Object::Dictionary(dict) => {
            Object::Dictionary(copy_dictionary(source, target, dict, memo)?)
        }
        Object::Array(items) => Object::Array(
            items
                .iter()
                .map(|item| deep_copy(source, target, item, memo))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Object::Stream(stream) => Object::Stream(Stream::new(
            copy_dictionary(source, target, &stream.dict, memo)?,
            stream.content.clone(),
        )),
        other => other.clone(),
    })
}

fn copy_dictionary(
    source: &Document,
    target: &mut Document,
    dict: &Dictionary,
    memo: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Dictionary, WatermarkError> {
    let mut copied = Dictionary::new();
    for (key, value) in dict.iter() {
        if key == b"Parent" {
            continue;
        }
        copied.set(key.clone(), deep_copy(source, target, value, memo)?);
    }
    Ok(copied)
}

/// Render a one-page A4 template carrying `label`.
pub fn render_template(label: &str) -> Vec<u8> {
    let mut doc = PdfDocument::new("Watermark");
    let ops = vec![
        Op::StartTextSection,
        Op::SetTextCursor {
            pos: Point {
                x: Pt(36.0),
                y: Pt(36.0),
            },
        },
        Op::SetFontSizeBuiltinFont {
            size: Pt(28.0),
            font: BuiltinFont::HelveticaBold,
        },
        Op::WriteTextBuiltinFont {
            items: vec![TextItem::Text(label.to_string())],
            font: BuiltinFont::HelveticaBold,
        },
        Op::EndTextSection,
    ];
    doc.with_pages(vec![PdfPage::new(Mm(210.0), Mm(297.0), ops)]);

    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);
    if !warnings.is_empty() {
        debug!(count = warnings.len(), "printpdf reported warnings while rendering template");
    }
    bytes
}

/// Write a rendered template to `path` unless a file is already there.
///
/// Returns `true` when a new template was written.
#[instrument(skip(label), fields(path = %path.display()))]
pub fn ensure_template(path: &Path, label: &str) -> Result<bool, WatermarkError> {
    if path.exists() {
        return Ok(false);
    }
    write_template(path, label)?;
    info!("Rendered default watermark template");
    Ok(true)
}

/// Render a template and atomically replace whatever is at `path`.
pub fn write_template(path: &Path, label: &str) -> Result<(), WatermarkError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&render_template(label))?;
    tmp.persist(path).map_err(|e| WatermarkError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_template_loads_as_single_page() {
        let bytes = render_template("DRAFT");
        assert_eq!(&bytes[0..4], b"%PDF");
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        assert!(Watermark::from_bytes(&bytes).is_ok());
    }

    #[tokio::test]
    async fn clones_stamp_on_blocking_workers() {
        let watermark = Watermark::from_bytes(&render_template("DRAFT")).unwrap();
        let source = render_template("SOURCE");
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let stamper = watermark.clone();
                let source = source.clone();
                tokio::task::spawn_blocking(move || stamper.apply(&source))
            })
            .collect();
        for handle in handles {
            let stamped = handle.await.unwrap().unwrap();
            assert_eq!(Document::load_mem(&stamped).unwrap().get_pages().len(), 1);
        }
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let result = Watermark::from_bytes(b"definitely not a pdf");
        assert!(matches!(result, Err(WatermarkError::Parse(_))));
    }

    #[test]
    fn overlay_scales_template_to_page() {
        let ops = overlay_ops("OrWatermark0", [0.0, 0.0, 300.0, 400.0], [0.0, 0.0, 600.0, 800.0]);
        assert!(ops.starts_with("Q\nq\n0.5000 0 0 0.5000 0.0000 0.0000 cm"));
        assert!(ops.contains("/OrWatermark0 Do"));
    }

    #[test]
    fn unused_name_skips_taken_entries() {
        let mut dict = Dictionary::new();
        dict.set("OrWatermark0", Object::Null);
        assert_eq!(unused_name(&dict), "OrWatermark1");
    }

    #[test]
    fn ensure_template_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("watermark.pdf");
        assert!(ensure_template(&path, "FIRST").unwrap());
        let first = std::fs::read(&path).unwrap();
        assert!(!ensure_template(&path, "SECOND").unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }
}
