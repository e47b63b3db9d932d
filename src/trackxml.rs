use crate::error::{Error, ParseError, Result};
use crate::{Coordinate, CoordinateSet, Format};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

/// A trackpoint node inside the event tree.
#[derive(Debug, Clone)]
struct Trackpoint {
    /// Index of the trackpoint's end event. New children go right before it.
    close: usize,
    prefix: Option<String>,
    lon: Option<String>,
    lat: Option<String>,
}

impl Trackpoint {
    fn has_position(&self) -> bool {
        self.lon.is_some() && self.lat.is_some()
    }

    fn coordinate(&self) -> Option<Coordinate> {
        Coordinate::parse(self.lon.as_deref()?, self.lat.as_deref()?)
    }

    fn elevation_name(&self, format: Format) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", format.elevation_tag()),
            None => format.elevation_tag().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    Lon,
    Lat,
}

impl Format {
    /// TCX keeps coordinates in `Position/LongitudeDegrees` and
    /// `Position/LatitudeDegrees` below the trackpoint.
    fn text_axis(self, path: &[Vec<u8>]) -> Option<Axis> {
        match (self, path) {
            (Format::Tcx, [position, leaf]) if position == b"Position" => {
                match leaf.as_slice() {
                    b"LongitudeDegrees" => Some(Axis::Lon),
                    b"LatitudeDegrees" => Some(Axis::Lat),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// GPX keeps coordinates as `lon`/`lat` attributes on the trackpoint.
    fn attribute_axis(self, key: &[u8]) -> Option<Axis> {
        match (self, key) {
            (Format::Gpx, b"lon") => Some(Axis::Lon),
            (Format::Gpx, b"lat") => Some(Axis::Lat),
            _ => None,
        }
    }
}

/// A parsed TCX or GPX document held as an owned event list.
///
/// Everything outside the trackpoints' elevation children is written back
/// the way quick-xml read it.
#[derive(Debug, Clone)]
pub struct Document {
    format: Format,
    events: Vec<Event<'static>>,
    trackpoints: Vec<Trackpoint>,
    coordinates: CoordinateSet,
}

impl Document {
    pub fn open(format: Format, path: &Path) -> Result<Document> {
        let input = std::fs::read(path).map_err(|source| ParseError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let document = Document::parse(format, &input)?;
        info!(
            path = %path.display(),
            %format,
            trackpoints = document.trackpoints.len(),
            "parsed track document"
        );
        Ok(document)
    }

    /// Loads `input` and locates every trackpoint in document order.
    ///
    /// Besides what quick-xml rejects on its own, a second root element,
    /// text outside the root, duplicate attributes and broken escapes make
    /// the document malformed.
    pub fn parse(format: Format, input: &[u8]) -> Result<Document> {
        let mut reader = Reader::from_reader(input);
        let mut buf = Vec::new();
        let mut events: Vec<Event<'static>> = Vec::new();
        let mut trackpoints = Vec::new();

        let mut depth = 0usize;
        let mut seen_root = false;
        // Open trackpoint and the local names of the elements open below it.
        let mut current: Option<(Trackpoint, usize)> = None;
        let mut path: Vec<Vec<u8>> = Vec::new();

        loop {
            let event = match reader.read_event_into(&mut buf) {
                Err(e) => return Err(malformed(reader.buffer_position(), e)),
                Ok(Event::Eof) => break,
                Ok(event) => event.into_owned(),
            };
            let position = reader.buffer_position();

            match event {
                Event::Start(ref e) => {
                    if depth == 0 && seen_root {
                        return Err(malformed(position, second_root(e)));
                    }
                    let attributes =
                        read_attributes(e).map_err(|reason| malformed(position, reason))?;
                    seen_root = true;
                    depth += 1;
                    if current.is_none() && e.local_name().as_ref() == format.trackpoint_tag() {
                        current = Some((open_trackpoint(format, e, &attributes), depth));
                        path.clear();
                    } else if current.is_some() {
                        path.push(e.local_name().as_ref().to_vec());
                    }
                    events.push(event);
                }

                Event::Empty(ref e) => {
                    if depth == 0 && seen_root {
                        return Err(malformed(position, second_root(e)));
                    }
                    let attributes =
                        read_attributes(e).map_err(|reason| malformed(position, reason))?;
                    seen_root = true;
                    if current.is_none() && e.local_name().as_ref() == format.trackpoint_tag() {
                        // Self-closing trackpoints get an explicit end so they can take children.
                        let mut trackpoint = open_trackpoint(format, e, &attributes);
                        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        events.push(Event::Start(e.clone()));
                        trackpoint.close = events.len();
                        events.push(Event::End(BytesEnd::new(name)));
                        trackpoints.push(trackpoint);
                    } else {
                        events.push(event);
                    }
                }

                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    match current.take() {
                        Some((mut trackpoint, open_depth)) if depth + 1 == open_depth => {
                            trackpoint.close = events.len();
                            trackpoints.push(trackpoint);
                        }
                        other => {
                            current = other;
                            if current.is_some() {
                                path.pop();
                            }
                        }
                    }
                    events.push(event);
                }

                Event::Text(ref e) => {
                    if depth == 0 && !e.iter().all(u8::is_ascii_whitespace) {
                        return Err(malformed(position, "text outside the root element"));
                    }
                    {
                        let text = e.unescape().map_err(|err| malformed(position, err))?;
                        if let Some((trackpoint, _)) = current.as_mut()
                            && let Some(axis) = format.text_axis(&path)
                        {
                            push_axis(trackpoint, axis, &text);
                        }
                    }
                    events.push(event);
                }

                Event::CData(ref e) => {
                    if depth == 0 {
                        return Err(malformed(position, "CDATA outside the root element"));
                    }
                    if let Some((trackpoint, _)) = current.as_mut()
                        && let Some(axis) = format.text_axis(&path)
                        && let Ok(text) = std::str::from_utf8(e)
                    {
                        push_axis(trackpoint, axis, text);
                    }
                    events.push(event);
                }

                event => events.push(event),
            }

            buf.clear();
        }

        if depth > 0 {
            return Err(ParseError::Truncated { open: depth }.into());
        }
        if !seen_root {
            return Err(ParseError::NoRoot.into());
        }

        Ok(Document {
            format,
            events,
            trackpoints,
            coordinates: CoordinateSet::new(),
        })
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn trackpoint_count(&self) -> usize {
        self.trackpoints.len()
    }

    /// The coordinates collected by the last call to [`Document::get_coordinates`].
    pub fn coordinates(&self) -> &CoordinateSet {
        &self.coordinates
    }

    /// Collects the unique coordinates of all trackpoints in document order.
    ///
    /// Trackpoints with a missing or non-numeric longitude or latitude are
    /// skipped. With `max_points > 0` the set is cut back to `max_points`
    /// entries whenever it reaches that size.
    pub fn get_coordinates(&mut self, max_points: usize) -> &CoordinateSet {
        let mut coordinates = CoordinateSet::new();
        for trackpoint in &self.trackpoints {
            if let Some(coordinate) = trackpoint.coordinate() {
                coordinates.insert(coordinate);
            }
            if max_points > 0 && coordinates.len() >= max_points {
                coordinates.truncate(max_points);
            }
        }
        debug!(unique = coordinates.len(), max_points, "collected coordinates");
        self.coordinates = coordinates;
        &self.coordinates
    }

    /// Appends one elevation element to every trackpoint.
    ///
    /// A trackpoint whose coordinate has no height in `coordinates` repeats
    /// the last known height, or 0 before any height was seen. Does nothing
    /// when `coordinates` is empty.
    pub fn append_altitudes(&mut self, coordinates: &CoordinateSet) {
        if coordinates.is_empty() {
            return;
        }

        let mut carry = 0.0_f64;
        let mut heights = Vec::with_capacity(self.trackpoints.len());
        for trackpoint in &self.trackpoints {
            if trackpoint.has_position()
                && let Some(height) = trackpoint.coordinate().and_then(|c| coordinates.height(&c))
            {
                carry = height;
            }
            heights.push(carry);
        }

        let format = self.format;
        let old = std::mem::take(&mut self.events);
        let mut events = Vec::with_capacity(old.len() + 3 * self.trackpoints.len());
        let mut pending = self.trackpoints.iter_mut().zip(heights).peekable();

        for (i, event) in old.into_iter().enumerate() {
            while let Some((trackpoint, height)) = pending.next_if(|(tp, _)| tp.close == i) {
                let name = trackpoint.elevation_name(format);
                let text = height.to_string();
                events.push(Event::Start(BytesStart::new(name.clone())));
                events.push(Event::Text(BytesText::new(&text).into_owned()));
                events.push(Event::End(BytesEnd::new(name)));
                trackpoint.close = events.len();
            }
            events.push(event);
        }

        self.events = events;
    }

    /// Serializes the tree as UTF-8, adding an XML declaration if the
    /// source had none.
    pub fn write<W: Write>(&self, output: W) -> Result<()> {
        let mut writer = Writer::new(output);

        if !matches!(self.events.first(), Some(Event::Decl(_))) {
            writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
            writer.write_event(Event::Text(BytesText::new("\n")))?;
        }
        for event in &self.events {
            writer.write_event(event.clone())?;
        }

        writer.into_inner().flush()?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|source| Error::Write {
            path: path.to_path_buf(),
            source,
        })?;
        self.write(BufWriter::new(file))?;
        info!(path = %path.display(), trackpoints = self.trackpoints.len(), "wrote track document");
        Ok(())
    }
}

fn malformed(position: impl fmt::Display, reason: impl fmt::Display) -> Error {
    ParseError::Malformed(format!("at position {position}: {reason}")).into()
}

fn second_root(start: &BytesStart<'_>) -> String {
    format!(
        "second root element <{}>",
        String::from_utf8_lossy(start.name().as_ref())
    )
}

/// Unescaped attributes of `start` as (local name, value) pairs.
fn read_attributes(
    start: &BytesStart<'_>,
) -> std::result::Result<Vec<(Vec<u8>, String)>, String> {
    start
        .attributes()
        .map(|attr| {
            let attr = attr.map_err(|e| e.to_string())?;
            let value = attr.unescape_value().map_err(|e| e.to_string())?;
            Ok((attr.key.local_name().as_ref().to_vec(), value.into_owned()))
        })
        .collect()
}

fn open_trackpoint(
    format: Format,
    start: &BytesStart<'_>,
    attributes: &[(Vec<u8>, String)],
) -> Trackpoint {
    let prefix = start
        .name()
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
    let mut trackpoint = Trackpoint {
        close: 0,
        prefix,
        lon: None,
        lat: None,
    };

    for (key, value) in attributes {
        if let Some(axis) = format.attribute_axis(key) {
            push_axis(&mut trackpoint, axis, value);
        }
    }

    trackpoint
}

fn push_axis(trackpoint: &mut Trackpoint, axis: Axis, text: &str) {
    let slot = match axis {
        Axis::Lon => &mut trackpoint.lon,
        Axis::Lat => &mut trackpoint.lat,
    };
    slot.get_or_insert_with(String::new).push_str(text);
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TrainingCenterDatabase xmlns="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2">
  <Activities>
    <Activity Sport="Biking">
      <Lap StartTime="2023-01-01T10:00:00Z">
        <Track>
          <Trackpoint>
            <Time>2023-01-01T10:00:00Z</Time>
            <Position>
              <LatitudeDegrees>37.7749</LatitudeDegrees>
              <LongitudeDegrees>-122.4194</LongitudeDegrees>
            </Position>
          </Trackpoint>
          <Trackpoint>
            <Time>2023-01-01T10:00:01Z</Time>
            <Position>
              <LatitudeDegrees>37.7750</LatitudeDegrees>
              <LongitudeDegrees>-122.4195</LongitudeDegrees>
            </Position>
          </Trackpoint>
          <Trackpoint>
            <Time>2023-01-01T10:00:02Z</Time>
            <Position>
              <LatitudeDegrees>37.7751</LatitudeDegrees>
              <LongitudeDegrees>-122.4196</LongitudeDegrees>
            </Position>
          </Trackpoint>
        </Track>
      </Lap>
    </Activity>
  </Activities>
</TrainingCenterDatabase>"#;

    fn tcx_with_points(points: &[(&str, &str)]) -> String {
        let mut body = String::new();
        for (lon, lat) in points {
            body.push_str(&format!(
                "<Trackpoint><Position><LatitudeDegrees>{lat}</LatitudeDegrees>\
                 <LongitudeDegrees>{lon}</LongitudeDegrees></Position></Trackpoint>"
            ));
        }
        format!("<TrainingCenterDatabase><Track>{body}</Track></TrainingCenterDatabase>")
    }

    fn render(document: &Document) -> String {
        let mut output = Vec::new();
        document.write(&mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    /// Reads the text of every element named `tag` in document order.
    fn element_texts(xml: &str, tag: &[u8]) -> Vec<String> {
        let mut reader = Reader::from_str(xml);
        let mut texts = Vec::new();
        let mut inside = false;
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) if e.local_name().as_ref() == tag => {
                    inside = true;
                    texts.push(String::new());
                }
                Event::End(e) if e.local_name().as_ref() == tag => inside = false,
                Event::Text(t) if inside => {
                    if let Some(last) = texts.last_mut() {
                        last.push_str(std::str::from_utf8(&t).unwrap());
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        texts
    }

    /// Tests that parse finds every TCX trackpoint and get_coordinates keeps their order.
    #[test]
    fn test_parse_locates_tcx_trackpoints() {
        let mut document = Document::parse(Format::Tcx, SAMPLE_TCX.as_bytes()).unwrap();
        assert_eq!(document.trackpoint_count(), 3);

        let coordinates = document.get_coordinates(0);
        let keys: Vec<_> = coordinates.keys().copied().collect();
        assert_eq!(
            keys,
            vec![
                Coordinate::new(-122.4194, 37.7749),
                Coordinate::new(-122.4195, 37.7750),
                Coordinate::new(-122.4196, 37.7751),
            ]
        );
        assert!(coordinates.iter().all(|(_, h)| h.is_none()));
    }

    /// Tests that unbalanced, truncated and empty input are parse errors.
    #[test]
    fn test_parse_rejects_malformed_input() {
        let unbalanced = "<TrainingCenterDatabase><Trackpoint></Lap></TrainingCenterDatabase>";
        assert!(matches!(
            Document::parse(Format::Tcx, unbalanced.as_bytes()),
            Err(Error::Parse(_))
        ));

        let truncated = "<TrainingCenterDatabase><Trackpoint>";
        assert!(matches!(
            Document::parse(Format::Tcx, truncated.as_bytes()),
            Err(Error::Parse(_))
        ));

        assert!(matches!(
            Document::parse(Format::Gpx, b""),
            Err(Error::Parse(ParseError::NoRoot))
        ));
    }

    /// Tests that a missing input file is reported as unreadable.
    #[test]
    fn test_open_missing_file() {
        let result = Document::open(Format::Gpx, Path::new("does/not/exist.gpx"));
        assert!(matches!(
            result,
            Err(Error::Parse(ParseError::Unreadable { .. }))
        ));
    }

    /// Tests that get_coordinates merges points equal after rounding and skips non-numeric ones.
    #[test]
    fn test_get_coordinates_deduplicates_and_skips_bad_points() {
        let xml = tcx_with_points(&[
            ("1.000001", "2"),
            ("abc", "2"),
            ("1", "2.000004"),
            ("3", "4"),
        ]);
        let mut document = Document::parse(Format::Tcx, xml.as_bytes()).unwrap();
        let coordinates = document.get_coordinates(0);
        let keys: Vec<_> = coordinates.keys().copied().collect();
        assert_eq!(keys, vec![Coordinate::new(1.0, 2.0), Coordinate::new(3.0, 4.0)]);
    }

    /// Tests that get_coordinates keeps the first max_points coordinates for a range of limits.
    #[test]
    fn test_get_coordinates_limited() {
        let points = [("0", "0"), ("1", "1"), ("2", "2"), ("3", "3"), ("4", "4")];
        let xml = tcx_with_points(&points);
        for (limit, expected) in [(0, 5), (1, 1), (2, 2), (4, 4), (5, 5), (6, 5)] {
            let mut document = Document::parse(Format::Tcx, xml.as_bytes()).unwrap();
            let coordinates = document.get_coordinates(limit);
            assert_eq!(coordinates.len(), expected, "limit {limit}");
            for (i, key) in coordinates.keys().enumerate() {
                assert_eq!(*key, Coordinate::new(i as f64, i as f64));
            }
        }
    }

    /// Tests that repeated coordinates do not use up the max_points limit.
    #[test]
    fn test_get_coordinates_limit_ignores_repeats() {
        let xml = tcx_with_points(&[("0", "0"), ("0", "0"), ("0", "0"), ("1", "1"), ("2", "2")]);
        let mut document = Document::parse(Format::Tcx, xml.as_bytes()).unwrap();
        let keys: Vec<_> = document.get_coordinates(2).keys().copied().collect();
        assert_eq!(keys, vec![Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)]);
    }

    /// Tests that an unresolved coordinate repeats the previous trackpoint's height.
    #[test]
    fn test_append_altitudes_forward_fills() {
        let xml = tcx_with_points(&[("1", "1"), ("2", "2"), ("3", "3")]);
        let mut document = Document::parse(Format::Tcx, xml.as_bytes()).unwrap();
        let coordinates: CoordinateSet = [
            (Coordinate::new(1.0, 1.0), Some(1.0)),
            (Coordinate::new(2.0, 2.0), None),
            (Coordinate::new(3.0, 3.0), Some(3.0)),
        ]
        .into_iter()
        .collect();

        document.append_altitudes(&coordinates);
        let output = render(&document);
        assert_eq!(element_texts(&output, b"AltitudeMeters"), vec!["1", "1", "3"]);
    }

    /// Tests that trackpoints before the first known height get 0 and points without position still get an altitude.
    #[test]
    fn test_append_altitudes_starts_at_zero_and_covers_points_without_position() {
        let xml = "<TrainingCenterDatabase><Track>\
            <Trackpoint><Time>t0</Time></Trackpoint>\
            <Trackpoint><Position><LatitudeDegrees>5</LatitudeDegrees>\
            <LongitudeDegrees>6</LongitudeDegrees></Position></Trackpoint>\
            <Trackpoint><Time>t2</Time></Trackpoint>\
            </Track></TrainingCenterDatabase>";
        let mut document = Document::parse(Format::Tcx, xml.as_bytes()).unwrap();
        let coordinates: CoordinateSet =
            [(Coordinate::new(6.0, 5.0), Some(250.5))].into_iter().collect();

        document.append_altitudes(&coordinates);
        let output = render(&document);
        assert_eq!(
            element_texts(&output, b"AltitudeMeters"),
            vec!["0", "250.5", "250.5"]
        );
    }

    /// Tests that append_altitudes leaves the document alone for an empty set.
    #[test]
    fn test_append_altitudes_with_empty_set_is_noop() {
        let mut document = Document::parse(Format::Tcx, SAMPLE_TCX.as_bytes()).unwrap();
        document.append_altitudes(&CoordinateSet::new());
        assert!(!render(&document).contains("AltitudeMeters"));
    }

    /// Tests that the altitude element is appended as the last child of the trackpoint.
    #[test]
    fn test_append_altitudes_places_element_inside_trackpoint() {
        let xml = tcx_with_points(&[("1", "1")]);
        let mut document = Document::parse(Format::Tcx, xml.as_bytes()).unwrap();
        let coordinates: CoordinateSet =
            [(Coordinate::new(1.0, 1.0), Some(42.0))].into_iter().collect();
        document.append_altitudes(&coordinates);
        assert!(render(&document).contains("</Position><AltitudeMeters>42</AltitudeMeters></Trackpoint>"));
    }

    /// Tests that a prefixed trackpoint gets an elevation element with the same prefix.
    #[test]
    fn test_elevation_reuses_trackpoint_prefix() {
        let xml = r#"<tcx:TrainingCenterDatabase xmlns:tcx="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2">
<tcx:Trackpoint><tcx:Position><tcx:LatitudeDegrees>1</tcx:LatitudeDegrees><tcx:LongitudeDegrees>2</tcx:LongitudeDegrees></tcx:Position></tcx:Trackpoint>
</tcx:TrainingCenterDatabase>"#;
        let mut document = Document::parse(Format::Tcx, xml.as_bytes()).unwrap();
        let coordinates = document.get_coordinates(0).clone();
        assert_eq!(coordinates.len(), 1);
        let coordinates: CoordinateSet = coordinates.keys().map(|c| (*c, Some(7.0))).collect();
        document.append_altitudes(&coordinates);
        assert!(render(&document).contains("<tcx:AltitudeMeters>7</tcx:AltitudeMeters></tcx:Trackpoint>"));
    }

    /// Tests that GPX coordinates come from attributes and self-closing trackpoints receive an ele child.
    #[test]
    fn test_gpx_attributes_and_self_closing_points() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><trkseg>
    <trkpt lat="37.7749" lon="-122.4194"><time>2023-01-01T10:00:00Z</time></trkpt>
    <trkpt lat="37.7750" lon="-122.4195"/>
    <trkpt lat="bad" lon="-122.4196"/>
  </trkseg></trk>
</gpx>"#;
        let mut document = Document::parse(Format::Gpx, xml.as_bytes()).unwrap();
        assert_eq!(document.trackpoint_count(), 3);

        let keys: Vec<_> = document.get_coordinates(0).keys().copied().collect();
        assert_eq!(
            keys,
            vec![
                Coordinate::new(-122.4194, 37.7749),
                Coordinate::new(-122.4195, 37.775)
            ]
        );

        let coordinates: CoordinateSet = keys
            .iter()
            .zip([10.0, 20.0])
            .map(|(c, h)| (*c, Some(h)))
            .collect();
        document.append_altitudes(&coordinates);
        let output = render(&document);
        assert_eq!(element_texts(&output, b"ele"), vec!["10", "20", "20"]);
        assert_eq!(output.matches("</trkpt>").count(), 3);
    }

    /// Tests that writing an untouched document reproduces the input exactly.
    #[test]
    fn test_write_keeps_existing_declaration() {
        let document = Document::parse(Format::Tcx, SAMPLE_TCX.as_bytes()).unwrap();
        let output = render(&document);
        assert_eq!(output.matches("<?xml").count(), 1);
        assert_eq!(output, SAMPLE_TCX);
    }

    /// Tests that write adds an XML declaration when the source had none.
    #[test]
    fn test_write_adds_missing_declaration() {
        let document = Document::parse(Format::Gpx, b"<gpx version=\"1.1\"/>").unwrap();
        let output = render(&document);
        assert!(output.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));
        assert!(output.ends_with("<gpx version=\"1.1\"/>"));
    }

    /// Tests that degree elements outside Position are not read as coordinates.
    #[test]
    fn test_text_in_other_elements_is_not_a_coordinate() {
        let xml = "<TrainingCenterDatabase><Trackpoint>\
            <LongitudeDegrees>1</LongitudeDegrees><LatitudeDegrees>2</LatitudeDegrees>\
            </Trackpoint></TrainingCenterDatabase>";
        let mut document = Document::parse(Format::Tcx, xml.as_bytes()).unwrap();
        assert!(document.get_coordinates(0).is_empty());
    }

    /// Tests that a second root element makes the document malformed.
    #[test]
    fn test_parse_rejects_second_root() {
        let xml = r#"<gpx><trk><trkseg><trkpt lat="1" lon="2"/></trkseg></trk></gpx><gpx/>"#;
        assert!(matches!(
            Document::parse(Format::Gpx, xml.as_bytes()),
            Err(Error::Parse(ParseError::Malformed(_)))
        ));
    }

    /// Tests that only whitespace may follow the root element.
    #[test]
    fn test_parse_rejects_text_after_root() {
        let xml = "<gpx><trk/></gpx>garbage";
        assert!(matches!(
            Document::parse(Format::Gpx, xml.as_bytes()),
            Err(Error::Parse(ParseError::Malformed(_)))
        ));

        let padded = "\n<gpx><trk/></gpx>\n  \n";
        assert!(Document::parse(Format::Gpx, padded.as_bytes()).is_ok());
    }

    /// Tests that an unescaped ampersand in text is rejected.
    #[test]
    fn test_parse_rejects_bare_ampersand() {
        let xml = "<TrainingCenterDatabase><Trackpoint>a & b</Trackpoint></TrainingCenterDatabase>";
        assert!(matches!(
            Document::parse(Format::Tcx, xml.as_bytes()),
            Err(Error::Parse(ParseError::Malformed(_)))
        ));
    }

    /// Tests that a repeated attribute is rejected on trackpoints and other elements alike.
    #[test]
    fn test_parse_rejects_duplicate_attributes() {
        for xml in [
            r#"<gpx><trk><trkseg><trkpt lat="1" lat="3" lon="2"/></trkseg></trk></gpx>"#,
            r#"<gpx version="1.1" version="1.0"><trk/></gpx>"#,
        ] {
            assert!(
                matches!(
                    Document::parse(Format::Gpx, xml.as_bytes()),
                    Err(Error::Parse(ParseError::Malformed(_)))
                ),
                "{xml} should be rejected"
            );
        }
    }

    /// Tests that character references in coordinates are resolved and written back unchanged.
    #[test]
    fn test_parse_resolves_character_references() {
        let tcx = tcx_with_points(&[("&#45;122.4", "37.7")]);
        let mut document = Document::parse(Format::Tcx, tcx.as_bytes()).unwrap();
        let keys: Vec<_> = document.get_coordinates(0).keys().copied().collect();
        assert_eq!(keys, vec![Coordinate::new(-122.4, 37.7)]);
        assert_eq!(document.coordinates().len(), 1);
        assert!(render(&document).contains("&#45;122.4"));

        let gpx = r#"<gpx><trk><trkseg><trkpt lat="37.7" lon="&#45;122.4"/></trkseg></trk></gpx>"#;
        let mut document = Document::parse(Format::Gpx, gpx.as_bytes()).unwrap();
        let keys: Vec<_> = document.get_coordinates(0).keys().copied().collect();
        assert_eq!(keys, vec![Coordinate::new(-122.4, 37.7)]);
    }
}
