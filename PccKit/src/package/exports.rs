//! Export payload access, replacement and name-table edits

use std::io::{Read, Seek};

use super::negotiate::{ExportLayout, ExportSlot, SHADER_CACHE_CLASS, SHADER_CACHE_OBJECT};
use super::{LoadLevel, NameEntry, Package};
use crate::error::{Error, Result};

impl<R: Read + Seek> Package<R> {
    /// Payload of an export: the in-memory replacement if there is one,
    /// otherwise the bytes stored in the package
    pub fn export_data(&mut self, id: usize) -> Result<Vec<u8>> {
        self.require(LoadLevel::Tables)?;
        let export = self.export(id)?;
        if let Some(data) = &export.new_data {
            return Ok(data.clone());
        }
        let (offset, size) = (export.data_offset(), export.data_size());
        let mut data = Vec::with_capacity(size as usize);
        self.get_data(offset, size, &mut data)?;
        Ok(data)
    }

    /// Replace an export's payload.
    ///
    /// A payload that grows is moved to the end-of-data watermark; one that
    /// shrinks or keeps its size stays where it is.
    pub fn set_export_data(&mut self, id: usize, data: impl Into<Vec<u8>>) -> Result<()> {
        self.require(LoadLevel::Tables)?;
        let data = data.into();
        let new_size = u32::try_from(data.len()).map_err(|_| Error::TooLarge {
            what: "export payload",
            value: data.len() as u64,
        })?;
        let old_size = self.export(id)?.data_size();

        if new_size > old_size {
            let offset = self.exports_end_offset;
            let end = u64::from(offset) + u64::from(new_size);
            let end = u32::try_from(end).map_err(|_| Error::TooLarge {
                what: "export data end",
                value: end,
            })?;
            let export = &mut self.exports[id];
            export.set_data_offset(offset);
            export.set_data_size(new_size);
            export.new_data = Some(data);
            self.exports_end_offset = end;
            tracing::debug!("Export {id} grew {old_size} -> {new_size} bytes, moved to {offset}");
        } else {
            let export = &mut self.exports[id];
            export.set_data_size(new_size);
            export.new_data = Some(data);
            self.exports_end_offset = self.compute_exports_end();
        }

        self.modified = true;
        Ok(())
    }

    /// Move an export's payload to the end-of-data watermark.
    ///
    /// The payload is materialized first so it is still available after its
    /// stored location is given up.
    pub fn move_export_data_to_end(&mut self, id: usize) -> Result<()> {
        self.require(LoadLevel::Tables)?;
        let data = self.export_data(id)?;
        let size = self.exports[id].data_size();
        let offset = self.exports_end_offset;
        let end = u64::from(offset) + u64::from(size);
        let end = u32::try_from(end).map_err(|_| Error::TooLarge {
            what: "export data end",
            value: end,
        })?;

        let export = &mut self.exports[id];
        export.set_data_offset(offset);
        export.new_data = Some(data);
        self.exports_end_offset = end;
        self.modified = true;
        Ok(())
    }

    pub fn name(&self, index: usize) -> Result<&str> {
        self.names
            .get(index)
            .map(NameEntry::name)
            .ok_or(Error::NameIndexOutOfRange {
                index,
                count: self.names.len(),
            })
    }

    pub fn find_name(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.name() == name)
    }

    /// Index of `name`, appending it to the name table if missing
    pub fn add_name(&mut self, name: &str) -> Result<usize> {
        self.require(LoadLevel::Tables)?;
        if let Some(index) = self.find_name(name) {
            return Ok(index);
        }
        self.names.push(NameEntry::new(name, self.header.version, 0));
        self.modified = true;
        Ok(self.names.len() - 1)
    }

    /// Change the string stored at a name index; the index stays valid for
    /// every table that refers to it
    pub fn set_name(&mut self, index: usize, name: &str) -> Result<()> {
        self.require(LoadLevel::Tables)?;
        let version = self.header.version;
        let count = self.names.len();
        let entry = self
            .names
            .get_mut(index)
            .ok_or(Error::NameIndexOutOfRange { index, count })?;
        if entry.name() != name {
            entry.rename(name, version);
            self.modified = true;
        }
        Ok(())
    }

    /// Name-table lookup that tolerates bad indices in object records
    fn name_or_empty(&self, index: i32) -> &str {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.names.get(i))
            .map_or("", NameEntry::name)
    }

    /// Object name of an export
    pub fn export_object_name(&self, id: usize) -> Result<&str> {
        let export = self.export(id)?;
        Ok(self.name_or_empty(export.object_name_id()))
    }

    /// Class name of an export, resolved through the import or export table
    pub fn export_class_name(&self, id: usize) -> Result<&str> {
        let class_id = self.export(id)?.class_id();
        Ok(self.object_name(class_id).unwrap_or(""))
    }

    /// Name of an object reference: negative = import, positive = export,
    /// zero = the root `Class`
    fn object_name(&self, object: i32) -> Option<&str> {
        match object {
            0 => Some("Class"),
            i if i < 0 => {
                let index = usize::try_from(-(i64::from(i)) - 1).ok()?;
                let import = self.imports.get(index)?;
                Some(self.name_or_empty(import.object_name_id()))
            }
            i => {
                let index = usize::try_from(i - 1).ok()?;
                let export = self.exports.get(index)?;
                Some(self.name_or_empty(export.object_name_id()))
            }
        }
    }

    /// First export with the given object name and class name
    pub fn find_export(&self, object_name: &str, class_name: &str) -> Option<usize> {
        (0..self.exports.len()).find(|&id| {
            self.export_object_name(id).is_ok_and(|n| n == object_name)
                && self.export_class_name(id).is_ok_and(|c| c == class_name)
        })
    }

    /// Whether an export must never be relocated
    pub fn is_pinned(&self, id: usize) -> bool {
        self.export_object_name(id)
            .is_ok_and(|n| n == SHADER_CACHE_OBJECT)
            && self
                .export_class_name(id)
                .is_ok_and(|c| c == SHADER_CACHE_CLASS)
    }

    /// Snapshot of the current payload placement
    pub fn export_layout(&self) -> ExportLayout {
        let slots = self
            .exports
            .iter()
            .enumerate()
            .map(|(id, export)| ExportSlot {
                id,
                offset: export.data_offset(),
                size: export.data_size(),
                pinned: self.is_pinned(id),
            })
            .collect();
        ExportLayout::new(slots, u64::from(self.exports_end_offset))
    }
}
