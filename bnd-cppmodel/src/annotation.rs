//! SAL annotation decoding.
//!
//! CastXML reports SAL annotations, calling conventions and `uuid(...)` as a
//! single `attributes` string per declaration, e.g.
//! `annotate(SAL_pre) annotate(SAL_writableTo(elementCount(1))) __stdcall__`.
//! Decoding happens in two steps: [`tokenize`] turns that string into
//! [`Token`]s, and [`decode`] runs them through a small state machine.

use tracing::warn;

use crate::model::{CallConv, ParamAttribute};

/// Wrapper CastXML puts around each SAL annotation.
const ANNOTATE_PREFIX: &str = "annotate(";

/// One classified item of an attribute string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    BlockBegin,
    BlockEnd,
    Pre,
    Post,
    Valid,
    MaybeNull,
    /// `SAL_readableTo(...)` / `SAL_writableTo(...)`.
    Range {
        writable: bool,
        single_element: bool,
    },
    CallConv(CallConv),
    Uuid(String),
    Other(String),
}

/// Everything an attribute string can say about a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotations {
    pub calling_convention: Option<CallConv>,
    pub param: ParamAttribute,
    pub guid: Option<String>,
}

/// Remove whitespace and double quotes nested inside parentheses.
///
/// Clang may print spaces inside an annotation's argument list, which would
/// otherwise split one annotation into several tokens.
fn strip_nested_whitespace(attributes: &str) -> String {
    let mut depth = 0i32;
    let mut out = String::with_capacity(attributes.len());
    for c in attributes.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            c if depth > 0 && (c.is_whitespace() || c == '"') => continue,
            _ => {}
        }
        out.push(c);
    }
    out
}

/// Split an attribute string into classified tokens.
pub fn tokenize(attributes: &str) -> Vec<Token> {
    strip_nested_whitespace(attributes)
        .split(' ')
        .map(|item| classify(item.strip_prefix(ANNOTATE_PREFIX).unwrap_or(item)))
        .collect()
}

fn classify(item: &str) -> Token {
    if item.starts_with("SAL_begin") {
        Token::BlockBegin
    } else if item.starts_with("SAL_end") {
        Token::BlockEnd
    } else if item.starts_with("SAL_pre") {
        Token::Pre
    } else if item.starts_with("SAL_post") {
        Token::Post
    } else if item.starts_with("SAL_valid") {
        Token::Valid
    } else if item.starts_with("SAL_maybenull")
        || (item.starts_with("SAL_null") && item.contains("__maybe"))
    {
        Token::MaybeNull
    } else if item.starts_with("SAL_readableTo") || item.starts_with("SAL_writableTo") {
        Token::Range {
            writable: item.starts_with("SAL_writableTo"),
            single_element: item.contains("SPECSTRINGIZE(1)") || item.contains("elementCount(1)"),
        }
    } else if item.starts_with("__stdcall__") {
        Token::CallConv(CallConv::StdCall)
    } else if item.starts_with("__cdecl__") {
        Token::CallConv(CallConv::CDecl)
    } else if item.starts_with("__thiscall__") {
        Token::CallConv(CallConv::ThisCall)
    } else if let Some(rest) = item.strip_prefix("uuid(") {
        Token::Uuid(rest.trim_matches(')').trim_matches(['"', '{', '}']).to_string())
    } else {
        Token::Other(item.to_string())
    }
}

/// Decode an `attributes` string. Returns `None` when it is absent or blank,
/// in which case the declaration keeps its defaults.
pub fn decode(attributes: Option<&str>) -> Option<Annotations> {
    let attributes = attributes.filter(|a| !a.trim().is_empty())?;
    Some(decode_tokens(&tokenize(attributes)))
}

/// Run tokens through the pre/post state machine.
pub fn decode_tokens(tokens: &[Token]) -> Annotations {
    let mut calling_convention = None;
    let mut param = ParamAttribute::empty();
    let mut guid = None;

    let mut is_pre = false;
    let mut is_post = false;
    let mut has_writable = false;
    let mut block = 0u32;

    for token in tokens {
        match token {
            Token::BlockBegin => block += 1,
            Token::BlockEnd => match block.checked_sub(1) {
                Some(b) => block = b,
                None => warn!("SAL annotation block end without begin (broken Clang/CastXML version)"),
            },
            Token::Pre => {
                is_pre = true;
                is_post = false;
            }
            Token::Post => {
                is_pre = false;
                is_post = true;
            }
            Token::Valid if is_post => param |= ParamAttribute::OUT,
            Token::MaybeNull => param |= ParamAttribute::OPTIONAL,
            Token::Range {
                writable,
                single_element,
            } => {
                if *writable {
                    if is_pre {
                        param |= ParamAttribute::OUT;
                    }
                    has_writable = true;
                }
                if !single_element {
                    param |= ParamAttribute::BUFFER;
                }
            }
            Token::CallConv(cc) => calling_convention = Some(*cc),
            Token::Uuid(g) => guid = Some(g.clone()),
            Token::Valid | Token::Other(_) => {}
        }
    }

    if block != 0 {
        warn!(open = block, "unbalanced SAL annotation blocks (broken Clang/CastXML version)");
    }

    if !has_writable {
        param |= ParamAttribute::IN;
    }
    if param.contains(ParamAttribute::IN | ParamAttribute::OUT) {
        param.remove(ParamAttribute::IN | ParamAttribute::OUT);
        param |= ParamAttribute::IN_OUT;
    }

    Annotations {
        calling_convention,
        param,
        guid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_inside_parens_is_removed() {
        let tokens = tokenize(r#"annotate(SAL_writableTo( elementCount( "1" ) )) __stdcall__"#);
        assert_eq!(
            tokens,
            vec![
                Token::Range {
                    writable: true,
                    single_element: true
                },
                Token::CallConv(CallConv::StdCall),
            ]
        );
    }

    #[test]
    fn absent_or_blank_decodes_to_none() {
        assert_eq!(decode(None), None);
        assert_eq!(decode(Some("  ")), None);
    }

    #[test]
    fn plain_input_parameter() {
        let a = decode(Some("annotate(SAL_pre) annotate(SAL_valid)")).unwrap();
        assert_eq!(a.param, ParamAttribute::IN);
        assert_eq!(a.calling_convention, None);
    }

    #[test]
    fn out_pointer_single_element() {
        // _Out_ : pre writableTo(elementCount(1)), post valid
        let a = decode(Some(
            "annotate(SAL_begin) annotate(SAL_pre) annotate(SAL_writableTo(elementCount(1))) \
             annotate(SAL_post) annotate(SAL_valid) annotate(SAL_end)",
        ))
        .unwrap();
        assert_eq!(a.param, ParamAttribute::OUT);
    }

    #[test]
    fn out_buffer_maybe_null() {
        let a = decode(Some(
            "annotate(SAL_pre) annotate(SAL_writableTo(elementCount(count))) \
             annotate(SAL_post) annotate(SAL_valid) annotate(SAL_maybenull)",
        ))
        .unwrap();
        assert_eq!(
            a.param,
            ParamAttribute::OUT | ParamAttribute::BUFFER | ParamAttribute::OPTIONAL
        );
    }

    #[test]
    fn in_and_out_collapse_to_in_out() {
        // readableTo keeps the default In; the post-valid adds Out.
        let a = decode(Some(
            "annotate(SAL_pre) annotate(SAL_readableTo(elementCount(1))) \
             annotate(SAL_post) annotate(SAL_valid)",
        ))
        .unwrap();
        assert_eq!(a.param, ParamAttribute::IN_OUT);
    }

    #[test]
    fn valid_outside_post_is_ignored() {
        let a = decode(Some("annotate(SAL_pre) annotate(SAL_valid)")).unwrap();
        assert!(!a.param.contains(ParamAttribute::OUT));
    }

    #[test]
    fn uuid_and_calling_convention() {
        let a = decode(Some(r#"uuid("{6f15aaf2-d208-4e89-9ab4-489535d34f9c}") __thiscall__"#))
            .unwrap();
        assert_eq!(a.guid.as_deref(), Some("6f15aaf2-d208-4e89-9ab4-489535d34f9c"));
        assert_eq!(a.calling_convention, Some(CallConv::ThisCall));
    }

    #[test]
    fn unbalanced_end_keeps_scanning() {
        let a = decode(Some(
            "annotate(SAL_end) annotate(SAL_pre) annotate(SAL_writableTo(byteCount(n)))",
        ))
        .unwrap();
        assert_eq!(a.param, ParamAttribute::OUT | ParamAttribute::BUFFER);
    }
}
