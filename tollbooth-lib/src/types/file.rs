use std::fmt;

/// A file attached to a request, sent as one part of a multipart body.
#[derive(Clone, PartialEq, Eq)]
pub struct File {
    /// Part name and file name presented to the server
    pub name: String,
    /// Raw content
    pub data: Vec<u8>,
}

impl File {
    /// Create an attachment from a name and its content.
    #[must_use]
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

// Attachments can be large; only print their size.
impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .finish()
    }
}
