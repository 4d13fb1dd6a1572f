use super::document::{Element, Node};
use super::dtd::{is_name, is_nmtoken, AttributeDecl, AttributeDefault, AttributeType, ContentSpec, Dtd};
use super::error::ValidationError;
use std::collections::HashSet;

/// IDs declared and IDREFs used while walking the tree.
#[derive(Default)]
struct IdTracker {
    ids: HashSet<String>,
    references: Vec<String>,
}

/// Validates a document tree against a DTD.
///
/// Returns the first violation found, walking the tree in document order.
/// IDREF targets are checked once the whole tree has been visited.
pub fn validate(dtd: &Dtd, root: &Element) -> Result<(), ValidationError> {
    let mut tracker = IdTracker::default();
    validate_element(dtd, root, &mut tracker)?;

    if let Some(missing) = tracker
        .references
        .iter()
        .find(|reference| !tracker.ids.contains(reference.as_str()))
    {
        return Err(invalid(format!(
            "IDREF attribute references an unknown ID \"{missing}\""
        )));
    }
    Ok(())
}

fn validate_element(
    dtd: &Dtd,
    element: &Element,
    tracker: &mut IdTracker,
) -> Result<(), ValidationError> {
    let name = &element.name;
    let spec = dtd
        .element(name)
        .ok_or_else(|| invalid(format!("No declaration for element {name}")))?;

    validate_attributes(dtd, element, tracker)?;

    match spec {
        ContentSpec::Empty => {
            if !element.children.is_empty() {
                return Err(invalid(format!(
                    "Element {name} was declared EMPTY this one has content"
                )));
            }
        }
        ContentSpec::Any => {}
        ContentSpec::Mixed(allowed) => {
            if let Some(child) = element
                .child_elements()
                .find(|child| !allowed.contains(&child.name))
            {
                return Err(invalid(format!(
                    "Element {} is not declared in {name} list of possible children",
                    child.name
                )));
            }
        }
        ContentSpec::Children(model) => {
            let has_character_data = element.children.iter().any(|node| match node {
                Node::Text(text) => !is_xml_whitespace(text),
                Node::Element(_) => false,
            });
            if has_character_data {
                return Err(invalid(format!(
                    "Element {name} should not contain character data"
                )));
            }

            let children: Vec<&str> = element
                .child_elements()
                .map(|child| child.name.as_str())
                .collect();
            if !model.matches(&children) {
                return Err(invalid(format!(
                    "Element {name} content does not follow the DTD, expecting {model}, got ({})",
                    children.join(" ")
                )));
            }
        }
    }

    for child in element.child_elements() {
        validate_element(dtd, child, tracker)?;
    }
    Ok(())
}

fn validate_attributes(
    dtd: &Dtd,
    element: &Element,
    tracker: &mut IdTracker,
) -> Result<(), ValidationError> {
    let name = &element.name;
    let declared = dtd.attributes_of(name);

    for (key, value) in &element.attributes {
        let decl = declared
            .iter()
            .find(|decl| &decl.name == key)
            .ok_or_else(|| invalid(format!("No declaration for attribute {key} of element {name}")))?;
        validate_attribute_value(dtd, name, decl, value, tracker)?;
    }

    for decl in declared {
        if decl.default == AttributeDefault::Required && element.attribute(&decl.name).is_none() {
            return Err(invalid(format!(
                "Element {name} does not carry attribute {}",
                decl.name
            )));
        }
    }
    Ok(())
}

fn validate_attribute_value(
    dtd: &Dtd,
    element: &str,
    decl: &AttributeDecl,
    value: &str,
    tracker: &mut IdTracker,
) -> Result<(), ValidationError> {
    let attribute = &decl.name;
    // Tokenized types compare on the whitespace-normalized value.
    let value = match decl.kind {
        AttributeType::CData => value.to_string(),
        _ => value.split_whitespace().collect::<Vec<_>>().join(" "),
    };

    if let AttributeDefault::Fixed(fixed) = &decl.default {
        if &value != fixed {
            return Err(invalid(format!(
                "Value for attribute {attribute} of {element} is different from default \"{fixed}\""
            )));
        }
    }

    let bad_value = || {
        invalid(format!(
            "Syntax of value for attribute {attribute} of {element} is not valid: \"{value}\""
        ))
    };

    match &decl.kind {
        AttributeType::CData => {}
        AttributeType::Id => {
            if !is_name(&value) {
                return Err(bad_value());
            }
            if !tracker.ids.insert(value.clone()) {
                return Err(invalid(format!("ID {value} already defined")));
            }
        }
        AttributeType::IdRef => {
            if !is_name(&value) {
                return Err(bad_value());
            }
            tracker.references.push(value.clone());
        }
        AttributeType::IdRefs => {
            if value.is_empty() || !value.split(' ').all(is_name) {
                return Err(bad_value());
            }
            tracker
                .references
                .extend(value.split(' ').map(str::to_string));
        }
        AttributeType::Entity | AttributeType::Entities => {
            if value.is_empty() {
                return Err(bad_value());
            }
            if let Some(unknown) = value.split(' ').find(|entity| !dtd.has_entity(entity)) {
                return Err(invalid(format!(
                    "ENTITY attribute {attribute} of {element} references an unknown entity \"{unknown}\""
                )));
            }
        }
        AttributeType::NmToken => {
            if !is_nmtoken(&value) {
                return Err(bad_value());
            }
        }
        AttributeType::NmTokens => {
            if value.is_empty() || !value.split(' ').all(is_nmtoken) {
                return Err(bad_value());
            }
        }
        AttributeType::Enumeration(allowed) | AttributeType::Notation(allowed) => {
            if !allowed.iter().any(|token| token == &value) {
                return Err(invalid(format!(
                    "Value \"{value}\" for attribute {attribute} of {element} is not among the enumerated set"
                )));
            }
        }
    }
    Ok(())
}

fn is_xml_whitespace(text: &str) -> bool {
    text.chars().all(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
}

fn invalid(msg: String) -> ValidationError {
    ValidationError::Invalid(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::document::parse_document;

    fn check(dtd: &str, xml: &str) -> Result<(), ValidationError> {
        let dtd = Dtd::parse(dtd).unwrap();
        let doc = parse_document(xml.as_bytes()).unwrap();
        validate(&dtd, &doc.root)
    }

    const LIST_DTD: &str = r#"
<!ELEMENT LIST (HEADER?, ITEM*)>
<!ELEMENT HEADER (#PCDATA)>
<!ELEMENT ITEM (NAME, NOTE?)>
<!ATTLIST ITEM
    key ID #REQUIRED
    parent IDREF #IMPLIED
    state (open | closed) "open"
    schema CDATA #FIXED "1">
<!ELEMENT NAME (#PCDATA)>
<!ELEMENT NOTE (#PCDATA | B)*>
<!ELEMENT B EMPTY>
"#;

    #[test]
    fn test_valid_document() {
        let xml = r#"<LIST>
  <HEADER>h</HEADER>
  <ITEM key="a"><NAME>one</NAME></ITEM>
  <ITEM key="b" parent="a" state="closed" schema="1"><NAME>two</NAME><NOTE>x <B/> y</NOTE></ITEM>
</LIST>"#;
        assert!(check(LIST_DTD, xml).is_ok());
    }

    #[test]
    fn test_empty_list_is_valid() {
        assert!(check(LIST_DTD, "<LIST/>").is_ok());
    }

    #[test]
    fn test_undeclared_element() {
        let err = check(LIST_DTD, "<LIST><OTHER/></LIST>").unwrap_err();
        assert!(err.to_string().contains("OTHER"));
    }

    #[test]
    fn test_wrong_child_order() {
        let xml = r#"<LIST><ITEM key="a"><NAME>n</NAME></ITEM><HEADER>h</HEADER></LIST>"#;
        let err = check(LIST_DTD, xml).unwrap_err();
        assert!(matches!(err, ValidationError::Invalid(ref m) if m.contains("does not follow the DTD")));
    }

    #[test]
    fn test_missing_required_child() {
        let xml = r#"<LIST><ITEM key="a"><NOTE>n</NOTE></ITEM></LIST>"#;
        assert!(check(LIST_DTD, xml).is_err());
    }

    #[test]
    fn test_character_data_in_element_content() {
        let xml = r#"<LIST>stray<ITEM key="a"><NAME>n</NAME></ITEM></LIST>"#;
        let err = check(LIST_DTD, xml).unwrap_err();
        assert!(err.to_string().contains("character data"));
    }

    #[test]
    fn test_element_inside_pcdata_only() {
        let xml = r#"<LIST><HEADER><B/></HEADER></LIST>"#;
        assert!(check(LIST_DTD, xml).is_err());
    }

    #[test]
    fn test_empty_element_with_content() {
        let xml = r#"<LIST><ITEM key="a"><NAME>n</NAME><NOTE><B>x</B></NOTE></ITEM></LIST>"#;
        let err = check(LIST_DTD, xml).unwrap_err();
        assert!(err.to_string().contains("EMPTY"));
    }

    #[test]
    fn test_missing_required_attribute() {
        let xml = r#"<LIST><ITEM><NAME>n</NAME></ITEM></LIST>"#;
        let err = check(LIST_DTD, xml).unwrap_err();
        assert!(err.to_string().contains("does not carry attribute key"));
    }

    #[test]
    fn test_undeclared_attribute() {
        let xml = r#"<LIST><ITEM key="a" color="red"><NAME>n</NAME></ITEM></LIST>"#;
        assert!(check(LIST_DTD, xml).is_err());
    }

    #[test]
    fn test_enumeration_value_outside_set() {
        let xml = r#"<LIST><ITEM key="a" state="pending"><NAME>n</NAME></ITEM></LIST>"#;
        assert!(check(LIST_DTD, xml).is_err());
    }

    #[test]
    fn test_fixed_value_mismatch() {
        let xml = r#"<LIST><ITEM key="a" schema="2"><NAME>n</NAME></ITEM></LIST>"#;
        assert!(check(LIST_DTD, xml).is_err());
    }

    #[test]
    fn test_duplicate_id() {
        let xml = r#"<LIST><ITEM key="a"><NAME>n</NAME></ITEM><ITEM key="a"><NAME>m</NAME></ITEM></LIST>"#;
        let err = check(LIST_DTD, xml).unwrap_err();
        assert!(err.to_string().contains("already defined"));
    }

    #[test]
    fn test_dangling_idref() {
        let xml = r#"<LIST><ITEM key="a" parent="zz"><NAME>n</NAME></ITEM></LIST>"#;
        assert!(check(LIST_DTD, xml).is_err());
    }

    #[test]
    fn test_forward_idref_resolves() {
        let xml = r#"<LIST><ITEM key="a" parent="b"><NAME>n</NAME></ITEM><ITEM key="b"><NAME>m</NAME></ITEM></LIST>"#;
        assert!(check(LIST_DTD, xml).is_ok());
    }

    #[test]
    fn test_any_accepts_declared_children() {
        let dtd = "<!ELEMENT A ANY><!ELEMENT B EMPTY>";
        assert!(check(dtd, "<A>text<B/></A>").is_ok());
        assert!(check(dtd, "<A><C/></A>").is_err());
    }

    #[test]
    fn test_nmtokens() {
        let dtd = r#"<!ELEMENT A EMPTY><!ATTLIST A tags NMTOKENS #IMPLIED>"#;
        assert!(check(dtd, r#"<A tags=" x1  y-2 "/>"#).is_ok());
        assert!(check(dtd, r#"<A tags="a,b"/>"#).is_err());
    }
}
