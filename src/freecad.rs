//! FreeCAD container introspection.
//!
//! A `.fcstd` document is a ZIP archive holding `Document.xml` (object
//! declarations and their part-file references), `GuiDocument.xml`
//! (per-object visibility), and the B-rep part files. Introspection extracts
//! the archive into a scratch directory and joins both manifests into an
//! ordered entry list; the declaration position is the stable shape index.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

use crate::config::ConversionConfig;
use crate::error::ConversionError;
use crate::filesystem::{FsUtils, ScratchDir};
use crate::models::FreecadObjectEntry;

/// Opens FreeCAD document archives.
#[derive(Debug)]
pub struct FreecadIntrospector {
    scratch_root: PathBuf,
    max_zip_files: usize,
    max_extracted_bytes: u64,
}

/// An extracted FreeCAD document. The backing scratch directory lives as
/// long as the container; part paths become invalid once it is dropped.
#[derive(Debug)]
pub struct FreecadContainer {
    scratch: ScratchDir,
    entries: Vec<FreecadObjectEntry>,
}

impl FreecadContainer {
    /// All declared objects, in declaration order.
    pub fn entries(&self) -> &[FreecadObjectEntry] {
        &self.entries
    }

    /// Absolute path of an entry's part file inside the extracted archive.
    pub fn part_path(&self, entry: &FreecadObjectEntry) -> Option<PathBuf> {
        entry
            .data_file
            .as_ref()
            .map(|f| self.scratch.path().join(f))
    }
}

impl FreecadIntrospector {
    /// Create an introspector using the configured scratch root and archive
    /// limits.
    pub fn new(config: &ConversionConfig) -> Self {
        Self {
            scratch_root: config.effective_scratch_root(),
            max_zip_files: config.max_zip_files,
            max_extracted_bytes: config.max_extracted_bytes,
        }
    }

    /// Extract a `.fcstd` archive and join its object manifests.
    pub fn open(&self, path: &Path) -> Result<FreecadContainer, ConversionError> {
        let scratch = ScratchDir::create(&self.scratch_root)?;
        FsUtils::extract_zip(
            path,
            scratch.path(),
            self.max_zip_files,
            self.max_extracted_bytes,
        )?;

        let document = fs::read_to_string(scratch.path().join("Document.xml"))?;
        let objects = parse_document(&document)?;

        // GuiDocument.xml is optional; without it no visibility resolves.
        let visibility = match fs::read_to_string(scratch.path().join("GuiDocument.xml")) {
            Ok(gui) => parse_gui_document(&gui)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        let entries = objects
            .into_iter()
            .map(|(name, data_file)| {
                let visible = visibility.get(&name).copied();
                FreecadObjectEntry {
                    name,
                    data_file,
                    visible,
                }
            })
            .collect::<Vec<_>>();

        debug!(
            source = %path.display(),
            objects = entries.len(),
            "Introspected FreeCAD document"
        );

        Ok(FreecadContainer { scratch, entries })
    }
}

fn attribute(start: &BytesStart<'_>, name: &str) -> Result<Option<String>, ConversionError> {
    match start.try_get_attribute(name).map_err(quick_xml::Error::from)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

/// Parse `Document.xml`: object names in declaration order from the
/// `<Objects>` manifest, joined with each object's `Shape` part file from
/// the `<ObjectData>` section.
fn parse_document(xml: &str) -> Result<Vec<(String, Option<String>)>, ConversionError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut names: Vec<String> = Vec::new();
    let mut part_files: HashMap<String, String> = HashMap::new();

    let mut in_objects = false;
    let mut in_object_data = false;
    let mut current_object: Option<String> = None;
    let mut in_shape_property = false;

    let mut buf = Vec::new();
    loop {
        let event = reader.read_event_into(&mut buf)?;
        match &event {
            Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                b"Objects" => in_objects = true,
                b"ObjectData" => in_object_data = true,
                b"Object" if in_objects && !in_object_data => {
                    if let Some(name) = attribute(e, "name")? {
                        names.push(name);
                    }
                }
                b"Object" if in_object_data => {
                    current_object = attribute(e, "name")?;
                    in_shape_property = false;
                }
                b"Property" if in_object_data => {
                    in_shape_property = attribute(e, "name")?.as_deref() == Some("Shape");
                }
                b"Part" if in_shape_property => {
                    if let (Some(object), Some(file)) =
                        (current_object.clone(), attribute(e, "file")?)
                    {
                        part_files.insert(object, file);
                    }
                }
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"Objects" => in_objects = false,
                b"ObjectData" => in_object_data = false,
                b"Object" if in_object_data => {
                    current_object = None;
                    in_shape_property = false;
                }
                b"Property" => in_shape_property = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(names
        .into_iter()
        .map(|name| {
            let file = part_files.remove(&name);
            (name, file)
        })
        .collect())
}

/// Parse `GuiDocument.xml`: per-object `Visibility` boolean from each
/// view-provider block.
fn parse_gui_document(xml: &str) -> Result<HashMap<String, bool>, ConversionError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut visibility: HashMap<String, bool> = HashMap::new();

    let mut current_provider: Option<String> = None;
    let mut in_visibility_property = false;

    let mut buf = Vec::new();
    loop {
        let event = reader.read_event_into(&mut buf)?;
        match &event {
            Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                b"ViewProvider" => {
                    current_provider = attribute(e, "name")?;
                    in_visibility_property = false;
                }
                b"Property" => {
                    in_visibility_property =
                        attribute(e, "name")?.as_deref() == Some("Visibility");
                }
                b"Bool" if in_visibility_property => {
                    if let (Some(provider), Some(value)) =
                        (current_provider.clone(), attribute(e, "value")?)
                    {
                        visibility.insert(provider, value == "true");
                    }
                }
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"ViewProvider" => {
                    current_provider = None;
                    in_visibility_property = false;
                }
                b"Property" => in_visibility_property = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(visibility)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DOCUMENT_XML: &str = r#"<?xml version='1.0' encoding='utf-8'?>
<Document SchemaVersion="4">
    <Objects Count="3">
        <Object type="App::Origin" name="Origin" />
        <Object type="Part::Box" name="Box" />
        <Object type="Part::Cylinder" name="Cylinder" />
    </Objects>
    <ObjectData Count="3">
        <Object name="Origin">
            <Properties Count="1">
                <Property name="Label" type="App::PropertyString">
                    <String value="Origin"/>
                </Property>
            </Properties>
        </Object>
        <Object name="Box">
            <Properties Count="2">
                <Property name="Label" type="App::PropertyString">
                    <String value="Box"/>
                </Property>
                <Property name="Shape" type="Part::PropertyPartShape">
                    <Part file="BoxShape.brp"/>
                </Property>
            </Properties>
        </Object>
        <Object name="Cylinder">
            <Properties Count="1">
                <Property name="Shape" type="Part::PropertyPartShape">
                    <Part file="CylinderShape.brp"/>
                </Property>
            </Properties>
        </Object>
    </ObjectData>
</Document>
"#;

    const GUI_DOCUMENT_XML: &str = r#"<?xml version='1.0' encoding='utf-8'?>
<Document SchemaVersion="1">
    <ViewProviderData Count="2">
        <ViewProvider name="Box" expanded="0">
            <Properties Count="1">
                <Property name="Visibility" type="App::PropertyBool">
                    <Bool value="true"/>
                </Property>
            </Properties>
        </ViewProvider>
        <ViewProvider name="Cylinder" expanded="0">
            <Properties Count="1">
                <Property name="Visibility" type="App::PropertyBool">
                    <Bool value="false"/>
                </Property>
            </Properties>
        </ViewProvider>
    </ViewProviderData>
</Document>
"#;

    #[test]
    fn test_parse_document_declaration_order() {
        let objects = parse_document(DOCUMENT_XML).expect("parse");
        assert_eq!(
            objects,
            vec![
                ("Origin".to_string(), None),
                ("Box".to_string(), Some("BoxShape.brp".to_string())),
                ("Cylinder".to_string(), Some("CylinderShape.brp".to_string())),
            ]
        );
    }

    #[test]
    fn test_parse_gui_document_visibility() {
        let visibility = parse_gui_document(GUI_DOCUMENT_XML).expect("parse");
        assert_eq!(visibility.get("Box"), Some(&true));
        assert_eq!(visibility.get("Cylinder"), Some(&false));
        assert_eq!(visibility.get("Origin"), None);
    }

    fn make_fcstd(dir: &Path, with_gui: bool) -> PathBuf {
        let path = dir.join("model.fcstd");
        let file = std::fs::File::create(&path).expect("create");
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("Document.xml", options).expect("start");
        writer.write_all(DOCUMENT_XML.as_bytes()).expect("write");
        if with_gui {
            writer
                .start_file("GuiDocument.xml", options)
                .expect("start");
            writer
                .write_all(GUI_DOCUMENT_XML.as_bytes())
                .expect("write");
        }
        writer.start_file("BoxShape.brp", options).expect("start");
        writer.write_all(b"brep-bytes").expect("write");
        writer
            .start_file("CylinderShape.brp", options)
            .expect("start");
        writer.write_all(b"brep-bytes").expect("write");
        writer.finish().expect("finish");
        path
    }

    fn test_config(scratch: &Path) -> ConversionConfig {
        ConversionConfig {
            scratch_root: Some(scratch.to_path_buf()),
            ..ConversionConfig::default()
        }
    }

    #[test]
    fn test_open_joins_manifests() {
        let temp = tempfile::tempdir().expect("tempdir");
        let archive = make_fcstd(temp.path(), true);

        let introspector = FreecadIntrospector::new(&test_config(temp.path()));
        let container = introspector.open(&archive).expect("open");

        let entries = container.entries();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].name, "Origin");
        assert!(entries[0].data_file.is_none());
        assert!(!entries[0].is_visible());

        assert_eq!(entries[1].name, "Box");
        assert!(entries[1].is_visible());
        let part = container.part_path(&entries[1]).expect("part path");
        assert_eq!(std::fs::read(part).expect("read"), b"brep-bytes");

        assert_eq!(entries[2].name, "Cylinder");
        assert!(!entries[2].is_visible());
    }

    #[test]
    fn test_open_without_gui_document() {
        let temp = tempfile::tempdir().expect("tempdir");
        let archive = make_fcstd(temp.path(), false);

        let introspector = FreecadIntrospector::new(&test_config(temp.path()));
        let container = introspector.open(&archive).expect("open");

        // No view-provider data: nothing resolves visible.
        assert!(container.entries().iter().all(|e| !e.is_visible()));
        assert!(container.entries().iter().all(|e| e.visible.is_none()));
    }
}
