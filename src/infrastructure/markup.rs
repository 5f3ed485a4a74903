//! 单元标记渲染器
//!
//! 从单元定义中提取播放器关心的部分：顶层 `<fieldset>`（页面）和表单类元素。
//! 这不是完整的 HTML 解析器，只识别播放器需要的标签和属性；
//! 真正的排版由宿主负责，几何信息可以通过 `data-height` / `data-offset` 提示，
//! 也可以之后通过 [`UnitDom`] 的几何接口补上。

use phf::phf_set;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::AppResult;
use crate::infrastructure::unit_dom::{Element, OptionNode, UnitDom};

/// 不参与作答的 input 类型
static IGNORED_INPUT_TYPES: phf::Set<&'static str> = phf_set! {
    "hidden",
    "button",
    "submit",
    "reset",
    "image",
    "file",
};

type Attributes = HashMap<String, String>;

/// 进程内共用的渲染器，正则只编译一次
static SHARED: LazyLock<Result<MarkupRenderer, regex::Error>> = LazyLock::new(MarkupRenderer::compile);

/// 标记渲染器
pub struct MarkupRenderer {
    tag: Regex,
    attribute: Regex,
    skipped: Regex,
    entity: Regex,
}

impl MarkupRenderer {
    pub fn new() -> AppResult<Self> {
        Ok(Self::compile()?)
    }

    /// 共用实例
    pub fn shared() -> AppResult<&'static Self> {
        (*SHARED).as_ref().map_err(|e| e.clone().into())
    }

    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            tag: Regex::new(
                r#"<(/?)([a-zA-Z][a-zA-Z0-9-]*)((?:\s+[^\s=/>]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+))?)*)\s*/?>"#,
            )?,
            attribute: Regex::new(
                r#"([^\s=/>]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#,
            )?,
            skipped: Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->")?,
            entity: Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);")?,
        })
    }

    /// 把单元定义渲染为文档
    pub fn render(&self, definition: &str) -> UnitDom {
        let html = self.skipped.replace_all(definition, "");
        let html: &str = &html;

        let mut dom = UnitDom::new();
        let mut depth = 0usize;
        let mut page: Option<usize> = None;
        let mut open_select: Option<Element> = None;
        let mut pos = 0;

        while let Some(caps) = self.tag.captures_at(html, pos) {
            let Some(whole) = caps.get(0) else { break };
            pos = whole.end();
            let closing = !caps[1].is_empty();
            let tag_name = caps[2].to_ascii_lowercase();
            let attrs = self.parse_attributes(&caps[3]);

            match (closing, tag_name.as_str()) {
                (false, "fieldset") => {
                    depth += 1;
                    if depth == 1 {
                        page = Some(dom.add_page(number_attr(&attrs, "data-height").unwrap_or(0.0)));
                    }
                }
                (true, "fieldset") => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        page = None;
                    }
                }
                (false, "input") => {
                    let input_type = attrs
                        .get("type")
                        .map(|t| t.to_ascii_lowercase())
                        .unwrap_or_else(|| "text".to_string());
                    if IGNORED_INPUT_TYPES.contains(input_type.as_str()) {
                        continue;
                    }
                    let mut element = Element::input(&input_type);
                    if let Some(value) = attrs.get("value") {
                        element.value = self.decode_entities(value);
                    }
                    element.checked = attrs.contains_key("checked");
                    dom.add_element(self.apply_common(element, &attrs, page));
                }
                (false, "textarea") => {
                    let (text, end) = raw_text_until(html, pos, "textarea");
                    pos = end;
                    let element = Element::textarea().with_value(self.decode_entities(text));
                    dom.add_element(self.apply_common(element, &attrs, page));
                }
                (false, "select") => {
                    let element = Element::select(attrs.contains_key("multiple"));
                    open_select = Some(self.apply_common(element, &attrs, page));
                }
                (false, "option") => {
                    if let Some(select) = open_select.as_mut() {
                        let text = self.decode_entities(text_until_next_tag(html, pos).trim());
                        select.options.push(OptionNode {
                            value: attrs
                                .get("value")
                                .map(|v| self.decode_entities(v))
                                .unwrap_or(text),
                            selected: attrs.contains_key("selected"),
                        });
                    }
                }
                (true, "select") => {
                    if let Some(select) = open_select.take() {
                        dom.add_element(select);
                    }
                }
                (false, _) if is_content_editable(&attrs) => {
                    let text = self.decode_entities(text_until_next_tag(html, pos).trim());
                    let element = Element::content_editable().with_value(text);
                    dom.add_element(self.apply_common(element, &attrs, page));
                }
                _ => {}
            }
        }

        // 未闭合的 select 仍然算一个元素
        if let Some(select) = open_select.take() {
            dom.add_element(select);
        }

        debug!(
            "单元渲染完成: {} 个页面, {} 个表单元素",
            dom.page_count(),
            dom.len()
        );
        dom
    }

    fn parse_attributes(&self, raw: &str) -> Attributes {
        self.attribute
            .captures_iter(raw)
            .map(|caps| {
                let key = caps[1].to_ascii_lowercase();
                let value = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .or_else(|| caps.get(4))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                (key, value)
            })
            .collect()
    }

    fn apply_common(&self, mut element: Element, attrs: &Attributes, page: Option<usize>) -> Element {
        element.name = attrs.get("name").map(|n| self.decode_entities(n));
        element.html_id = attrs.get("id").map(|id| self.decode_entities(id));
        element.required = attrs.contains_key("required");
        element.readonly = attrs.contains_key("readonly");
        element.min = number_attr(attrs, "min");
        element.max = number_attr(attrs, "max");
        element.page = page;
        element.offset = number_attr(attrs, "data-offset").unwrap_or(0.0);
        element.height = number_attr(attrs, "data-height").unwrap_or(0.0);
        element
    }

    /// 解码常见的 HTML 实体
    pub fn decode_entities(&self, text: &str) -> String {
        self.entity
            .replace_all(text, |caps: &Captures| {
                let body = &caps[1];
                let decoded = match body {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    _ if body.starts_with("#x") || body.starts_with("#X") => {
                        u32::from_str_radix(&body[2..], 16).ok().and_then(char::from_u32)
                    }
                    _ if body.starts_with('#') => body[1..].parse().ok().and_then(char::from_u32),
                    _ => None,
                };
                decoded
                    .map(String::from)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// 渲染单元定义的便捷函数
pub fn render(definition: &str) -> AppResult<UnitDom> {
    Ok(MarkupRenderer::shared()?.render(definition))
}

fn number_attr(attrs: &Attributes, key: &str) -> Option<f64> {
    attrs.get(key).and_then(|v| v.trim().parse().ok())
}

fn is_content_editable(attrs: &Attributes) -> bool {
    attrs
        .get("contenteditable")
        .map(|v| !v.eq_ignore_ascii_case("false"))
        .unwrap_or(false)
}

fn text_until_next_tag(html: &str, from: usize) -> &str {
    let rest = &html[from..];
    rest.find('<').map(|i| &rest[..i]).unwrap_or(rest)
}

/// 读取 `<textarea>` 这类原始文本元素的内容，返回内容和闭合标签之后的位置
fn raw_text_until<'a>(html: &'a str, from: usize, tag: &str) -> (&'a str, usize) {
    let rest = &html[from..];
    let closing = format!("</{}", tag);
    match rest.to_ascii_lowercase().find(&closing) {
        Some(start) => {
            let after = rest[start..].find('>').map(|i| start + i + 1).unwrap_or(rest.len());
            (&rest[..start], from + after)
        }
        None => (rest, html.len()),
    }
}
