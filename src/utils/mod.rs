///! Some utility functions

use minidom::Element;

use crate::contact::{ContactRecord, VCARD_EXTENSION};

/// Walks an XML tree and returns every element that has the given name
pub fn find_elems<S: AsRef<str>>(root: &Element, searched_name: S) -> Vec<&Element> {
    let searched_name = searched_name.as_ref();
    let mut elems: Vec<&Element> = Vec::new();

    for el in root.children() {
        if el.name() == searched_name {
            elems.push(el);
        } else {
            let ret = find_elems(el, searched_name);
            elems.extend(ret);
        }
    }
    elems
}

/// Walks an XML tree until it finds an elements with the given name
pub fn find_elem<S: AsRef<str>>(root: &Element, searched_name: S) -> Option<&Element> {
    let searched_name = searched_name.as_ref();
    if root.name() == searched_name {
        return Some(root);
    }

    for el in root.children() {
        if el.name() == searched_name {
            return Some(el);
        } else {
            let ret = find_elem(el, searched_name);
            if ret.is_some() {
                return ret;
            }
        }
    }
    None
}

/// A fresh resource name for a new vCard, e.g. `0b3c...e2.vcf`
pub fn random_resource_name() -> String {
    format!("{}{}", uuid::Uuid::new_v4().to_hyphenated(), VCARD_EXTENSION)
}

/// A debug utility that pretty-prints contacts
pub fn print_contact_list(contacts: &[ContactRecord]) {
    for contact in contacts {
        let tag = contact.entity_tag.as_ref().map(|t| t.as_str()).unwrap_or("-");
        println!("  {}\t{}\t{} (version {})",
            contact.full_name,
            contact.email.as_deref().unwrap_or(""),
            contact.id,
            tag);
    }
}
