//! Objective-C method name parsing.
//!
//! Objective-C methods are named `-[Class(Category) selector:with:]` in
//! DWARF. The index files one method under several keys (class, class with
//! category, selector, name without category), so the pieces have to be cut
//! out of the full name.

/// Whether a method belongs to the class or to its instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjcMethodKind
{
    /// `+[Class selector]`
    Class,
    /// `-[Class selector]`
    Instance,
    /// `[Class selector]`, only accepted by non-strict parsing
    Unspecified,
}

/// A parsed Objective-C method name borrowing from the original string
///
/// ## Example
///
/// ```rust
/// use symdex_core::symbols::ObjcMethodName;
///
/// let method = ObjcMethodName::parse("-[MyClass(Category) doThing:]", true).unwrap();
/// assert_eq!(method.class_name(), "MyClass");
/// assert_eq!(method.class_name_with_category(), "MyClass(Category)");
/// assert_eq!(method.selector(), "doThing:");
/// assert_eq!(method.full_name_without_category().as_deref(), Some("-[MyClass doThing:]"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjcMethodName<'a>
{
    full: &'a str,
    kind: ObjcMethodKind,
}

impl<'a> ObjcMethodName<'a>
{
    /// Parse `name` as an Objective-C method
    ///
    /// The shortest accepted name is `[a b]`; with `strict` set the leading
    /// `+` or `-` is mandatory, making it `-[a b]`. Returns `None` for
    /// anything that does not look like a method.
    pub fn parse(name: &'a str, strict: bool) -> Option<Self>
    {
        let min_len = if strict { 6 } else { 5 };
        if name.len() < min_len || !name.ends_with(']') {
            return None;
        }

        let kind = if name.starts_with("+[") {
            ObjcMethodKind::Class
        } else if name.starts_with("-[") {
            ObjcMethodKind::Instance
        } else {
            ObjcMethodKind::Unspecified
        };

        if kind == ObjcMethodKind::Unspecified && (strict || !name.starts_with('[')) {
            return None;
        }

        Some(Self { full: name, kind })
    }

    pub fn kind(&self) -> ObjcMethodKind
    {
        self.kind
    }

    pub fn full_name(&self) -> &'a str
    {
        self.full
    }

    /// `Class` from `-[Class(Category) sel]`.
    pub fn class_name(&self) -> &'a str
    {
        let rest = self.after_bracket();
        let end = rest.find(['(', ' ']).unwrap_or(rest.len());
        &rest[..end]
    }

    /// `Class(Category)` from `-[Class(Category) sel]`, or just `Class` when
    /// there is no category.
    pub fn class_name_with_category(&self) -> &'a str
    {
        let rest = self.after_bracket();
        let end = rest.find(' ').unwrap_or(rest.len());
        &rest[..end]
    }

    /// `Category` from `-[Class(Category) sel]`, empty without a category.
    pub fn category(&self) -> &'a str
    {
        match (self.full.find('('), self.full.find(')')) {
            (Some(open), Some(close)) if open < close => &self.full[open + 1..close],
            _ => "",
        }
    }

    /// Everything between the first space and the closing bracket.
    pub fn selector(&self) -> &'a str
    {
        let Some(space) = self.full.find(' ') else {
            return "";
        };
        let close = self.full.rfind(']').unwrap_or(self.full.len());
        if close <= space {
            return "";
        }
        &self.full[space + 1..close]
    }

    /// `-[Class sel]` for `-[Class(Category) sel]`, `None` without a
    /// category.
    pub fn full_name_without_category(&self) -> Option<String>
    {
        if self.category().is_empty() {
            return None;
        }
        let open = self.full.find('(')?;
        let close = self.full.find(')')?;
        let mut name = String::with_capacity(self.full.len());
        name.push_str(&self.full[..open]);
        name.push_str(&self.full[close + 1..]);
        Some(name)
    }

    fn after_bracket(&self) -> &'a str
    {
        let start = if self.kind == ObjcMethodKind::Unspecified { 1 } else { 2 };
        &self.full[start..]
    }
}
