use std::borrow::Cow;
use std::fmt;

/// Validated names of classes, methods, and fields
pub trait Name: Sized {
    /// Reject strings which are not legal names of this kind
    fn validate(name: &str) -> Result<(), String>;

    fn from_cow(name: Cow<'static, str>) -> Self;

    fn as_str(&self) -> &str;

    fn from_str(name: &str) -> Result<Self, String> {
        Self::validate(name)?;
        Ok(Self::from_cow(Cow::Owned(name.to_owned())))
    }
}

/// Method or field name, eg. `toString`
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Slash-separated class name, eg. `java/lang/String`
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BinaryName(Cow<'static, str>);

impl Name for UnqualifiedName {
    fn validate(name: &str) -> Result<(), String> {
        if name.is_empty() {
            return Err(String::from("empty unqualified name"));
        }
        match name.chars().find(|c| matches!(c, '.' | ';' | '[' | '/')) {
            Some(c) => Err(format!("unqualified name '{}' contains '{}'", name, c)),
            None => Ok(()),
        }
    }

    fn from_cow(name: Cow<'static, str>) -> Self {
        UnqualifiedName(name)
    }

    fn as_str(&self) -> &str {
        &self.0
    }
}

impl Name for BinaryName {
    fn validate(name: &str) -> Result<(), String> {
        if name.is_empty() {
            return Err(String::from("empty binary name"));
        }
        for segment in name.split('/') {
            UnqualifiedName::validate(segment)
                .map_err(|err| format!("in binary name '{}': {}", name, err))?;
        }
        Ok(())
    }

    fn from_cow(name: Cow<'static, str>) -> Self {
        BinaryName(name)
    }

    fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! print_as_str {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }

            impl fmt::Debug for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

print_as_str!(UnqualifiedName, BinaryName);

impl UnqualifiedName {
    // Angle brackets are only legal in these two
    pub const INIT: Self = UnqualifiedName(Cow::Borrowed("<init>"));
    pub const CLINIT: Self = UnqualifiedName(Cow::Borrowed("<clinit>"));
}

impl BinaryName {
    pub const OBJECT: Self = BinaryName(Cow::Borrowed("java/lang/Object"));
    pub const STRING: Self = BinaryName(Cow::Borrowed("java/lang/String"));
    pub const CLASS: Self = BinaryName(Cow::Borrowed("java/lang/Class"));
    pub const THROWABLE: Self = BinaryName(Cow::Borrowed("java/lang/Throwable"));
    pub const METHODTYPE: Self = BinaryName(Cow::Borrowed("java/lang/invoke/MethodType"));
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validity() {
        assert!(BinaryName::from_str("java/lang/Object").is_ok());
        assert!(BinaryName::from_str("java//Object").is_err());
        assert!(BinaryName::from_str("").is_err());
        assert!(UnqualifiedName::from_str("foo").is_ok());
        assert!(UnqualifiedName::from_str("foo;bar").is_err());
        assert!(UnqualifiedName::from_str("java/lang").is_err());
        assert!(UnqualifiedName::from_str("<init>").is_ok());
    }

    #[test]
    fn printing() {
        let name = BinaryName::from_str("demo/Main").unwrap();
        assert_eq!(name.to_string(), "demo/Main");
        assert_eq!(format!("{:?}", BinaryName::STRING), "java/lang/String");
        assert_eq!(UnqualifiedName::INIT.as_str(), "<init>");
    }
}
