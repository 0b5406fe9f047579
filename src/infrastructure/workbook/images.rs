//! Embedded-image extraction from XLSX archives.
//!
//! calamine exposes cell values only, so images are pulled straight from the
//! zip parts: the first worksheet's relationships point at a drawing part,
//! the drawing's anchors carry the (col, row) each picture hangs from, and
//! the drawing's own relationships resolve `r:embed` ids to `xl/media/*`
//! payloads. The scan is pure and best-effort: workbooks without drawings
//! produce an empty index, broken parts are skipped.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use zip::ZipArchive;

use crate::domain::error::{AppError, Result};
use crate::domain::worksheet::{CellRef, ImageCellIndex, ImagePayload};

pub fn extract(path: &Path) -> Result<ImageCellIndex> {
    let file = File::open(path)
        .map_err(|e| AppError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| AppError::Parse(format!("Not a valid XLSX archive: {}", e)))?;

    let mut index = ImageCellIndex::default();

    let Some(sheet_part) = first_sheet_part(&mut archive) else {
        return Ok(index);
    };

    let Some(sheet_rels) = read_part(&mut archive, &rels_for_part(&sheet_part)) else {
        return Ok(index);
    };
    let Some(drawing_target) = parse_relationships(&sheet_rels)
        .into_iter()
        .find(|rel| rel.rel_type.ends_with("/drawing"))
        .map(|rel| rel.target)
    else {
        return Ok(index);
    };
    let drawing_part = resolve_target(&sheet_part, &drawing_target);

    let Some(drawing_rels) = read_part(&mut archive, &rels_for_part(&drawing_part)) else {
        return Ok(index);
    };
    let media_by_rid: HashMap<String, String> = parse_relationships(&drawing_rels)
        .into_iter()
        .map(|rel| {
            let target = resolve_target(&drawing_part, &rel.target);
            (rel.id, target)
        })
        .collect();

    let Some(drawing_xml) = read_part(&mut archive, &drawing_part) else {
        return Ok(index);
    };

    for (cell, rid) in parse_drawing_anchors(&drawing_xml) {
        let Some(media_part) = media_by_rid.get(&rid) else {
            continue;
        };
        let Some(bytes) = read_part(&mut archive, media_part) else {
            continue;
        };
        let (name, extension) = split_media_name(media_part);
        index.insert(
            cell,
            ImagePayload {
                name,
                extension,
                bytes,
            },
        );
    }

    Ok(index)
}

/// The first worksheet, in workbook order: the workbook part lists `<sheet>`
/// elements in the order calamine (and Excel) presents them, and each one's
/// `r:id` resolves through the workbook's relationships to the sheet part.
/// Archives with a broken or absent workbook part fall back to a name scan.
fn first_sheet_part<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Option<String> {
    if let Some(part) = sheet_from_workbook(archive) {
        return Some(part);
    }

    let preferred = "xl/worksheets/sheet1.xml";
    let mut candidates: Vec<String> = archive
        .file_names()
        .filter(|name| name.starts_with("xl/worksheets/sheet") && name.ends_with(".xml"))
        .map(|name| name.to_string())
        .collect();
    if candidates.iter().any(|name| name == preferred) {
        return Some(preferred.to_string());
    }
    candidates.sort();
    candidates.into_iter().next()
}

fn sheet_from_workbook<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Option<String> {
    const WORKBOOK: &str = "xl/workbook.xml";
    let workbook_xml = read_part(archive, WORKBOOK)?;
    let rid = first_sheet_rid(&workbook_xml)?;
    let workbook_rels = read_part(archive, &rels_for_part(WORKBOOK))?;
    parse_relationships(&workbook_rels)
        .into_iter()
        .find(|rel| rel.id == rid)
        .map(|rel| resolve_target(WORKBOOK, &rel.target))
}

/// The `r:id` of the first `<sheet>` element in the workbook part.
fn first_sheet_rid(xml: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"sheet" {
                    for attr in e.attributes().flatten() {
                        // `r:id` whatever its prefix; `sheetId` has a
                        // different local name and is not a relationship.
                        if attr.key.local_name().as_ref() == b"id" {
                            if let Ok(value) = attr.unescape_value() {
                                return Some(value.into_owned());
                            }
                        }
                    }
                    return None;
                }
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<Vec<u8>> {
    let mut file = archive.by_name(name).ok()?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).ok()?;
    Some(bytes)
}

/// "xl/worksheets/sheet1.xml" -> "xl/worksheets/_rels/sheet1.xml.rels"
fn rels_for_part(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolve a relationship target ("../media/image1.png") against the part
/// that declared it.
fn resolve_target(base_part: &str, target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let mut segments: Vec<&str> = base_part.split('/').collect();
    segments.pop(); // drop the file name
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn split_media_name(part: &str) -> (String, String) {
    let file = part.rsplit_once('/').map(|(_, f)| f).unwrap_or(part);
    match file.rsplit_once('.') {
        Some((name, ext)) => (name.to_string(), ext.to_lowercase()),
        None => (file.to_string(), String::new()),
    }
}

struct Relationship {
    id: String,
    target: String,
    rel_type: String,
}

fn parse_relationships(xml: &[u8]) -> Vec<Relationship> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut out = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() != b"Relationship" {
                    buf.clear();
                    continue;
                }
                let mut id = None;
                let mut target = None;
                let mut rel_type = None;
                for attr in e.attributes().flatten() {
                    let value = match attr.unescape_value() {
                        Ok(v) => v.into_owned(),
                        Err(_) => continue,
                    };
                    match attr.key.local_name().as_ref() {
                        b"Id" => id = Some(value),
                        b"Target" => target = Some(value),
                        b"Type" => rel_type = Some(value),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    out.push(Relationship {
                        id,
                        target,
                        rel_type: rel_type.unwrap_or_default(),
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    out
}

/// Walk the drawing XML and pair each picture's `r:embed` id with the cell
/// its anchor starts from. Anchors without a picture (charts, shapes) yield
/// nothing.
fn parse_drawing_anchors(xml: &[u8]) -> Vec<(CellRef, String)> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut out = Vec::new();

    let mut in_anchor = false;
    let mut in_from = false;
    let mut capture: Option<&'static str> = None;
    let mut from_col: Option<u32> = None;
    let mut from_row: Option<u32> = None;
    let mut embed: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                match e.local_name().as_ref() {
                    b"oneCellAnchor" | b"twoCellAnchor" | b"absoluteAnchor" => {
                        in_anchor = true;
                        from_col = None;
                        from_row = None;
                        embed = None;
                    }
                    b"from" if in_anchor => in_from = true,
                    b"col" if in_from => capture = Some("col"),
                    b"row" if in_from => capture = Some("row"),
                    b"blip" if in_anchor => {
                        for attr in e.attributes().flatten() {
                            if attr.key.local_name().as_ref() == b"embed" {
                                if let Ok(value) = attr.unescape_value() {
                                    embed = Some(value.into_owned());
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(kind) = capture {
                    if let Ok(text) = e.unescape() {
                        let parsed = text.trim().parse::<u32>().ok();
                        match kind {
                            "col" => from_col = parsed,
                            "row" => from_row = parsed,
                            _ => {}
                        }
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"from" => {
                    in_from = false;
                    capture = None;
                }
                b"col" | b"row" => capture = None,
                b"oneCellAnchor" | b"twoCellAnchor" | b"absoluteAnchor" => {
                    if let (Some(col), Some(row), Some(rid)) = (from_col, from_row, embed.take()) {
                        out.push((CellRef::new(row, col), rid));
                    }
                    in_anchor = false;
                    in_from = false;
                    capture = None;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    out
}
