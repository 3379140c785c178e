//! Minimal element tree for SOAP responses.
//!
//! The authority's envelopes mix `soap:`/`ns2:` prefixes between
//! environments, so elements are matched on local name only.

use quick_xml::Reader;
use quick_xml::events::Event;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Node {
    pub name: String,
    pub text: String,
    pub children: Vec<Node>,
}

impl Node {
    pub fn parse(input: &str) -> Result<Node, String> {
        let mut reader = Reader::from_str(input);
        let mut stack: Vec<Node> = vec![Node::default()];

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    stack.push(Node {
                        name: local_name(e.local_name().as_ref()),
                        ..Default::default()
                    });
                }
                Ok(Event::Empty(e)) => {
                    let node = Node {
                        name: local_name(e.local_name().as_ref()),
                        ..Default::default()
                    };
                    attach(&mut stack, node)?;
                }
                Ok(Event::End(_)) => {
                    let node = stack.pop().ok_or("unbalanced end tag")?;
                    if stack.is_empty() {
                        return Err("unbalanced end tag".into());
                    }
                    attach(&mut stack, node)?;
                }
                Ok(Event::Text(t)) => {
                    let text = t.unescape().map_err(|e| e.to_string())?;
                    if !text.trim().is_empty() {
                        current(&mut stack)?.text.push_str(&text);
                    }
                }
                Ok(Event::CData(c)) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    current(&mut stack)?.text.push_str(&text);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(format!(
                        "xml error at position {}: {e}",
                        reader.buffer_position()
                    ));
                }
            }
        }

        if stack.len() != 1 {
            return Err("unexpected end of document".into());
        }
        let mut root = stack.pop().unwrap_or_default();
        match root.children.len() {
            0 => Err("empty document".into()),
            _ => Ok(root.children.remove(0)),
        }
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First descendant (depth-first, self included) with this local name.
    pub fn find(&self, name: &str) -> Option<&Node> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// Trimmed text of a direct child, `None` when absent or blank.
    pub fn text_of(&self, name: &str) -> Option<String> {
        self.child(name)
            .map(|c| c.text.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn current(stack: &mut [Node]) -> Result<&mut Node, String> {
    stack.last_mut().ok_or_else(|| "text outside of any element".to_string())
}

fn attach(stack: &mut [Node], node: Node) -> Result<(), String> {
    current(stack)?.children.push(node);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_ignored() {
        let doc = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
            <soap:Body>
              <ns2:validarComprobanteResponse xmlns:ns2="http://ec.gob.sri.ws.recepcion">
                <RespuestaRecepcionComprobante><estado>RECIBIDA</estado><comprobantes/></RespuestaRecepcionComprobante>
              </ns2:validarComprobanteResponse>
            </soap:Body>
          </soap:Envelope>"#;

        let root = Node::parse(doc).unwrap();
        assert_eq!(root.name, "Envelope");
        let answer = root.find("RespuestaRecepcionComprobante").unwrap();
        assert_eq!(answer.text_of("estado").as_deref(), Some("RECIBIDA"));
        assert!(answer.child("comprobantes").unwrap().children.is_empty());
    }

    #[test]
    fn cdata_and_escaped_text_are_both_content() {
        let doc = "<a><b><![CDATA[<factura id=\"comprobante\"/>]]></b><c>&lt;x/&gt;</c></a>";
        let root = Node::parse(doc).unwrap();
        assert_eq!(root.text_of("b").as_deref(), Some("<factura id=\"comprobante\"/>"));
        assert_eq!(root.text_of("c").as_deref(), Some("<x/>"));
    }

    #[test]
    fn truncated_documents_are_errors() {
        assert!(Node::parse("<a><b>").is_err());
        assert!(Node::parse("").is_err());
    }
}
