//! Lightweight SOAP text inspection
//!
//! Requirement tests only need to answer questions like "does this envelope
//! carry a RelatesTo header" or "which action does it declare". These
//! helpers scan the serialized text by local element name and ignore
//! namespace prefixes.

/// SOAP action URIs used by the suite
pub mod action {
    const SDC: &str = "http://standards.ieee.org/downloads/11073/11073-20701-2018";

    macro_rules! sdc_action {
        ($name:ident, $path:literal) => {
            pub const $name: &str = concat!(
                "http://standards.ieee.org/downloads/11073/11073-20701-2018/",
                $path
            );
        };
    }

    sdc_action!(GET_MDIB, "GetService/GetMdib");
    sdc_action!(GET_MDIB_RESPONSE, "GetService/GetMdibResponse");
    sdc_action!(GET_MD_DESCRIPTION, "GetService/GetMdDescription");
    sdc_action!(GET_MD_DESCRIPTION_RESPONSE, "GetService/GetMdDescriptionResponse");
    sdc_action!(GET_MD_STATE, "GetService/GetMdState");
    sdc_action!(GET_MD_STATE_RESPONSE, "GetService/GetMdStateResponse");
    sdc_action!(GET_CONTEXT_STATES, "ContextService/GetContextStates");
    sdc_action!(GET_CONTEXT_STATES_RESPONSE, "ContextService/GetContextStatesResponse");
    sdc_action!(GET_CONTAINMENT_TREE, "ContainmentTreeService/GetContainmentTree");
    sdc_action!(GET_CONTAINMENT_TREE_RESPONSE, "ContainmentTreeService/GetContainmentTreeResponse");
    sdc_action!(GET_DESCRIPTOR, "ContainmentTreeService/GetDescriptor");
    sdc_action!(GET_DESCRIPTOR_RESPONSE, "ContainmentTreeService/GetDescriptorResponse");
    sdc_action!(GET_LOCALIZED_TEXT, "LocalizationService/GetLocalizedText");
    sdc_action!(GET_LOCALIZED_TEXT_RESPONSE, "LocalizationService/GetLocalizedTextResponse");
    sdc_action!(GET_SUPPORTED_LANGUAGES, "LocalizationService/GetSupportedLanguages");
    sdc_action!(GET_SUPPORTED_LANGUAGES_RESPONSE, "LocalizationService/GetSupportedLanguagesResponse");
    sdc_action!(EPISODIC_METRIC_REPORT, "StateEventService/EpisodicMetricReport");
    sdc_action!(EPISODIC_ALERT_REPORT, "StateEventService/EpisodicAlertReport");
    sdc_action!(EPISODIC_COMPONENT_REPORT, "StateEventService/EpisodicComponentReport");
    sdc_action!(EPISODIC_OPERATIONAL_STATE_REPORT, "StateEventService/EpisodicOperationalStateReport");
    sdc_action!(EPISODIC_CONTEXT_REPORT, "ContextService/EpisodicContextReport");
    sdc_action!(DESCRIPTION_MODIFICATION_REPORT, "DescriptionEventService/DescriptionModificationReport");
    sdc_action!(WAVEFORM_STREAM, "WaveformService/WaveformStream");

    pub const HELLO: &str = "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/Hello";
    pub const BYE: &str = "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/Bye";
    pub const SOAP_FAULT: &str = "http://www.w3.org/2005/08/addressing/soap/fault";

    /// True for actions defined by IEEE 11073-20701
    pub fn is_sdc(action: &str) -> bool {
        action.starts_with(SDC)
    }
}

/// One element occurrence found in a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element<'a> {
    pub qualified_name: &'a str,
    attributes: &'a str,
    /// Raw content between start and end tag, `None` for empty elements
    pub content: Option<&'a str>,
}

impl<'a> Element<'a> {
    /// Value of an attribute matched by local name
    pub fn attribute(&self, local: &str) -> Option<&'a str> {
        attributes(self.attributes)
            .find(|(name, _)| local_name(name) == local)
            .map(|(_, value)| value)
    }

    pub fn text(&self) -> Option<&'a str> {
        self.content.map(str::trim)
    }
}

/// Iterator over elements with a given local name
pub struct Elements<'a> {
    xml: &'a str,
    local: &'a str,
    pos: usize,
}

impl<'a> Iterator for Elements<'a> {
    type Item = Element<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.xml.len() {
            let lt = self.pos + self.xml[self.pos..].find('<')?;
            let rest = &self.xml[lt + 1..];
            if rest.starts_with(|c: char| matches!(c, '/' | '?' | '!')) {
                self.pos = lt + 1;
                continue;
            }
            let name_end = rest.find(|c: char| c.is_whitespace() || c == '/' || c == '>')?;
            let gt = rest.find('>')?;
            let name = &rest[..name_end];
            let inner = &rest[name_end..gt];
            let after = lt + 1 + gt + 1;
            self.pos = after;

            if local_name(name) != self.local {
                continue;
            }
            let self_closing = inner.trim_end().ends_with('/');
            let content = if self_closing {
                None
            } else {
                let close = format!("</{}>", name);
                self.xml[after..]
                    .find(&close)
                    .map(|end| &self.xml[after..after + end])
            };
            return Some(Element {
                qualified_name: name,
                attributes: inner.trim_end().trim_end_matches('/'),
                content,
            });
        }
        None
    }
}

/// All elements named `local`, in document order
pub fn elements<'a>(xml: &'a str, local: &'a str) -> Elements<'a> {
    Elements { xml, local, pos: 0 }
}

pub fn find_element<'a>(xml: &'a str, local: &'a str) -> Option<Element<'a>> {
    elements(xml, local).next()
}

pub fn contains_element(xml: &str, local: &str) -> bool {
    find_element(xml, local).is_some()
}

/// Trimmed text of the first element named `local`
pub fn element_text<'a>(xml: &'a str, local: &'a str) -> Option<&'a str> {
    find_element(xml, local).and_then(|e| e.text())
}

pub fn is_fault(xml: &str) -> bool {
    contains_element(xml, "Fault")
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn attributes(raw: &str) -> impl Iterator<Item = (&str, &str)> {
    let mut rest = raw;
    std::iter::from_fn(move || {
        rest = rest.trim_start();
        let eq = rest.find('=')?;
        let name = rest[..eq].trim();
        let value_part = rest[eq + 1..].trim_start();
        let quote = value_part.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let body = &value_part[1..];
        let end = body.find(quote)?;
        let value = &body[..end];
        rest = &body[end + 1..];
        Some((name, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENVELOPE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<s12:Envelope xmlns:s12="http://www.w3.org/2003/05/soap-envelope" xmlns:wsa="http://www.w3.org/2005/08/addressing">
  <s12:Header>
    <wsa:Action>http://standards.ieee.org/downloads/11073/11073-20701-2018/DescriptionEventService/DescriptionModificationReport</wsa:Action>
    <wsa:RelatesTo RelationshipType='reply'> urn:uuid:1 </wsa:RelatesTo>
  </s12:Header>
  <s12:Body>
    <msg:DescriptionModificationReport MdibVersion="42" SequenceId="urn:uuid:seq"/>
  </s12:Body>
</s12:Envelope>"#;

    #[test]
    fn test_element_text_ignores_prefix() {
        assert!(element_text(ENVELOPE, "Action")
            .unwrap()
            .ends_with("DescriptionModificationReport"));
        assert_eq!(element_text(ENVELOPE, "RelatesTo"), Some("urn:uuid:1"));
        assert_eq!(element_text(ENVELOPE, "MessageID"), None);
    }

    #[test]
    fn test_attributes_on_empty_element() {
        let report = find_element(ENVELOPE, "DescriptionModificationReport").unwrap();
        assert_eq!(report.content, None);
        assert_eq!(report.attribute("MdibVersion"), Some("42"));
        assert_eq!(report.attribute("SequenceId"), Some("urn:uuid:seq"));
        assert_eq!(report.attribute("InstanceId"), None);

        let relates = find_element(ENVELOPE, "RelatesTo").unwrap();
        assert_eq!(relates.attribute("RelationshipType"), Some("reply"));
    }

    #[test]
    fn test_fault_detection_and_counting() {
        assert!(!is_fault(ENVELOPE));
        let fault = "<s:Envelope><s:Body><s:Fault><s:Code/></s:Fault></s:Body></s:Envelope>";
        assert!(is_fault(fault));
        assert_eq!(elements("<a/><b><a>x</a></b>", "a").count(), 2);
    }

    #[test]
    fn test_sdc_action_prefix() {
        assert!(action::is_sdc(action::GET_MDIB));
        assert!(!action::is_sdc(action::HELLO));
    }
}
