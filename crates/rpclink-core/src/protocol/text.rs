//! Textual codec for the two wire message shapes.
//!
//! Documents look like:
//!
//! ```text
//! <InvokeMessage ObjectName="Calc" MethodName="Add" Asynchronous="false">
//!   <Parameter Type="Int32"><![CDATA[2]]></Parameter>
//!   <Parameter Type="Int32"><![CDATA[3]]></Parameter>
//! </InvokeMessage>
//! ```
//!
//! ```text
//! <InvokeResult StatusCode="4" ObjectMethod="Calc.Add">
//!   <Return Type="Int32"><![CDATA[5]]></Return>
//! </InvokeResult>
//! ```
//!
//! The encoder and parser are hand-written for exactly these two shapes.
//! Attribute values are entity-escaped; payloads travel in CDATA sections.
//! A parameter with no CDATA section (or a self-closing `<Parameter/>`) is a
//! null parameter.
//!
//! Framing is handled one layer down: each document is sent as one
//! length-prefixed frame, so a document never needs to be self-delimiting on
//! the stream.

use crate::is_valid_identifier;
use crate::protocol::messages::{InvokeRequest, InvokeResult, StatusCode, WireParam};
use crate::protocol::WireError;
use crate::value::TypeDesc;

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encodes an [`InvokeRequest`] as a UTF-8 document.
pub fn encode_request(req: &InvokeRequest) -> Result<String, WireError> {
    if !is_valid_identifier(&req.object_name) {
        return Err(WireError::InvalidIdentifier {
            field: "ObjectName".to_string(),
            value: req.object_name.clone(),
        });
    }
    if !is_valid_identifier(&req.method_name) {
        return Err(WireError::InvalidIdentifier {
            field: "MethodName".to_string(),
            value: req.method_name.clone(),
        });
    }

    let mut out = String::new();
    out.push_str("<InvokeMessage ObjectName=\"");
    out.push_str(&escape_attr(&req.object_name));
    out.push_str("\" MethodName=\"");
    out.push_str(&escape_attr(&req.method_name));
    out.push_str("\" Asynchronous=\"");
    out.push_str(if req.asynchronous { "true" } else { "false" });
    out.push('"');
    if let Some(comment) = &req.comment {
        out.push_str(" Comment=\"");
        out.push_str(&escape_attr(comment));
        out.push('"');
    }

    if req.parameters.is_empty() {
        out.push_str("/>");
        return Ok(out);
    }

    out.push_str(">\n");
    for param in &req.parameters {
        out.push_str("  <Parameter");
        if let Some(hint) = &param.hint {
            out.push_str(" Type=\"");
            out.push_str(&escape_attr(&hint.wire_name()));
            out.push('"');
        }
        match &param.text {
            None => out.push_str("/>\n"),
            Some(text) => {
                out.push('>');
                push_cdata(&mut out, text)?;
                out.push_str("</Parameter>\n");
            }
        }
    }
    out.push_str("</InvokeMessage>");
    Ok(out)
}

/// Encodes an [`InvokeResult`] as a UTF-8 document.
pub fn encode_result(res: &InvokeResult) -> Result<String, WireError> {
    let mut out = String::new();
    out.push_str("<InvokeResult StatusCode=\"");
    out.push_str(&res.status.as_i32().to_string());
    out.push_str("\" ObjectMethod=\"");
    out.push_str(&escape_attr(&res.object_method));
    out.push('"');
    if let Some(msg) = &res.exception_message {
        out.push_str(" ExceptionMessage=\"");
        out.push_str(&escape_attr(msg));
        out.push('"');
    }

    match (&res.return_type, &res.return_value) {
        (Some(ty), Some(value)) => {
            out.push_str(">\n  <Return Type=\"");
            out.push_str(&escape_attr(&ty.wire_name()));
            out.push_str("\">");
            push_cdata(&mut out, value)?;
            out.push_str("</Return>\n</InvokeResult>");
        }
        _ => out.push_str("/>"),
    }
    Ok(out)
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

fn push_cdata(out: &mut String, text: &str) -> Result<(), WireError> {
    if text.contains("]]>") {
        return Err(WireError::UnencodableValue);
    }
    out.push_str("<![CDATA[");
    out.push_str(text);
    out.push_str("]]>");
    Ok(())
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decodes an [`InvokeRequest`] document.
pub fn decode_request(doc: &str) -> Result<InvokeRequest, WireError> {
    let mut c = Cursor::new(doc);
    c.skip_ws();
    c.expect("<InvokeMessage")?;
    let (attrs, self_closing) = c.parse_attrs()?;

    let object_name = require_attr(&attrs, "InvokeMessage", "ObjectName")?;
    let method_name = require_attr(&attrs, "InvokeMessage", "MethodName")?;
    if !is_valid_identifier(&object_name) {
        return Err(WireError::InvalidIdentifier {
            field: "ObjectName".to_string(),
            value: object_name,
        });
    }
    if !is_valid_identifier(&method_name) {
        return Err(WireError::InvalidIdentifier {
            field: "MethodName".to_string(),
            value: method_name,
        });
    }
    let asynchronous = find_attr(&attrs, "Asynchronous")
        .map(|v| v == "true")
        .unwrap_or(false);
    let comment = find_attr(&attrs, "Comment");

    let mut parameters = Vec::new();
    if !self_closing {
        loop {
            c.skip_ws();
            if c.eat("</InvokeMessage>") {
                break;
            }
            c.expect("<Parameter")?;
            let (pattrs, pself) = c.parse_attrs()?;
            let hint = match find_attr(&pattrs, "Type") {
                Some(name) => {
                    Some(TypeDesc::parse(&name).ok_or(WireError::BadTypeName(name))?)
                }
                None => None,
            };
            if pself {
                parameters.push(WireParam { text: None, hint });
                continue;
            }
            c.skip_ws();
            let text = c.parse_cdata()?;
            c.skip_ws();
            c.expect("</Parameter>")?;
            parameters.push(WireParam { text, hint });
        }
    }

    c.finish()?;
    Ok(InvokeRequest {
        object_name,
        method_name,
        parameters,
        asynchronous,
        comment,
    })
}

/// Decodes an [`InvokeResult`] document.
pub fn decode_result(doc: &str) -> Result<InvokeResult, WireError> {
    let mut c = Cursor::new(doc);
    c.skip_ws();
    c.expect("<InvokeResult")?;
    let (attrs, self_closing) = c.parse_attrs()?;

    let status_text = require_attr(&attrs, "InvokeResult", "StatusCode")?;
    let status = status_text
        .parse::<i32>()
        .ok()
        .and_then(StatusCode::from_i32)
        .ok_or(WireError::BadStatusCode(status_text))?;
    let object_method = require_attr(&attrs, "InvokeResult", "ObjectMethod")?;
    let exception_message = find_attr(&attrs, "ExceptionMessage");

    let mut return_type = None;
    let mut return_value = None;
    if !self_closing {
        c.skip_ws();
        if !c.eat("</InvokeResult>") {
            c.expect("<Return")?;
            let (rattrs, rself) = c.parse_attrs()?;
            let type_name = require_attr(&rattrs, "Return", "Type")?;
            return_type =
                Some(TypeDesc::parse(&type_name).ok_or(WireError::BadTypeName(type_name))?);
            if !rself {
                c.skip_ws();
                return_value = c.parse_cdata()?;
                c.skip_ws();
                c.expect("</Return>")?;
            }
            c.skip_ws();
            c.expect("</InvokeResult>")?;
        }
    }

    c.finish()?;
    Ok(InvokeResult {
        status,
        object_method,
        return_type,
        return_value,
        exception_message,
    })
}

fn find_attr(attrs: &[(String, String)], name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.clone())
}

fn require_attr(
    attrs: &[(String, String)],
    tag: &str,
    name: &str,
) -> Result<String, WireError> {
    find_attr(attrs, name).ok_or_else(|| WireError::MissingAttribute {
        tag: tag.to_string(),
        attr: name.to_string(),
    })
}

// ── Cursor: a minimal scanner over the document ───────────────────────────────

struct Cursor<'a> {
    doc: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(doc: &'a str) -> Self {
        Self { doc, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.doc[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.doc.len() - trimmed.len();
    }

    fn eat(&mut self, lit: &str) -> bool {
        if self.rest().starts_with(lit) {
            self.pos += lit.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, lit: &str) -> Result<(), WireError> {
        if self.eat(lit) {
            Ok(())
        } else if self.rest().is_empty() {
            Err(WireError::UnexpectedEnd)
        } else {
            Err(WireError::Expected {
                expected: lit.to_string(),
                at: self.pos,
            })
        }
    }

    /// Parses attributes up to (and including) the tag terminator.
    /// Returns the attribute list and whether the tag was self-closing.
    fn parse_attrs(&mut self) -> Result<(Vec<(String, String)>, bool), WireError> {
        let mut attrs = Vec::new();
        loop {
            self.skip_ws();
            if self.eat("/>") {
                return Ok((attrs, true));
            }
            if self.eat(">") {
                return Ok((attrs, false));
            }
            let name = self.read_name();
            if name.is_empty() {
                return if self.rest().is_empty() {
                    Err(WireError::UnexpectedEnd)
                } else {
                    Err(WireError::Expected {
                        expected: "attribute name".to_string(),
                        at: self.pos,
                    })
                };
            }
            self.skip_ws();
            self.expect("=")?;
            self.skip_ws();
            self.expect("\"")?;
            let raw = self.take_until('"')?;
            let value = unescape(raw)?;
            self.expect("\"")?;
            attrs.push((name, value));
        }
    }

    fn read_name(&mut self) -> String {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|(_, c)| !c.is_ascii_alphanumeric() && *c != '_')
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let name = rest[..end].to_string();
        self.pos += end;
        name
    }

    fn take_until(&mut self, stop: char) -> Result<&'a str, WireError> {
        match self.rest().find(stop) {
            Some(i) => {
                let taken = &self.rest()[..i];
                self.pos += i;
                Ok(taken)
            }
            None => Err(WireError::UnexpectedEnd),
        }
    }

    /// Parses an optional CDATA section.  Absent CDATA means a null value.
    fn parse_cdata(&mut self) -> Result<Option<String>, WireError> {
        if !self.eat("<![CDATA[") {
            return Ok(None);
        }
        match self.rest().find("]]>") {
            Some(i) => {
                let text = self.rest()[..i].to_string();
                self.pos += i + "]]>".len();
                Ok(Some(text))
            }
            None => Err(WireError::UnexpectedEnd),
        }
    }

    /// Asserts nothing but whitespace remains.
    fn finish(&mut self) -> Result<(), WireError> {
        self.skip_ws();
        if self.rest().is_empty() {
            Ok(())
        } else {
            Err(WireError::TrailingContent { at: self.pos })
        }
    }
}

fn unescape(s: &str) -> Result<String, WireError> {
    if !s.contains('&') {
        return Ok(s.to_string());
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(i) = rest.find('&') {
        out.push_str(&rest[..i]);
        rest = &rest[i..];
        let end = rest
            .find(';')
            .ok_or_else(|| WireError::BadEscape(rest.to_string()))?;
        let entity = &rest[..=end];
        match entity {
            "&amp;" => out.push('&'),
            "&lt;" => out.push('<'),
            "&gt;" => out.push('>'),
            "&quot;" => out.push('"'),
            "&apos;" => out.push('\''),
            other => return Err(WireError::BadEscape(other.to_string())),
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
