//-
// Copyright (c) 2026, Jason Lingle
//
// This file is part of Swallow.
//
// Swallow is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Swallow is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Swallow. If not, see <http://www.gnu.org/licenses/>.

use std::collections::HashMap;

use super::{KeyCache, Mode};
use crate::stream::InputByteStream;
use crate::support::error::Error;

/// A `KeyCache` held entirely in memory.
///
/// Suitable for small messages; large attachments are better served by
/// `DiskKeyCache`.
#[derive(Debug, Default)]
pub struct ArrayKeyCache {
    contents: HashMap<String, HashMap<String, Vec<u8>>>,
}

impl KeyCache for ArrayKeyCache {
    fn set_bytes(
        &mut self,
        ns: &str,
        item: &str,
        bytes: &[u8],
        mode: Mode,
    ) -> Result<(), Error> {
        let data = self
            .contents
            .entry(ns.to_owned())
            .or_default()
            .entry(item.to_owned())
            .or_default();
        if Mode::Write == mode {
            data.clear();
        }
        data.extend_from_slice(bytes);
        Ok(())
    }

    fn get_bytes(
        &mut self,
        ns: &str,
        item: &str,
    ) -> Result<Option<Vec<u8>>, Error> {
        Ok(self
            .contents
            .get(ns)
            .and_then(|items| items.get(item))
            .cloned())
    }

    fn export_to_byte_stream(
        &mut self,
        ns: &str,
        item: &str,
        is: &mut dyn InputByteStream,
    ) -> Result<(), Error> {
        if let Some(data) = self.contents.get(ns).and_then(|i| i.get(item)) {
            is.write(data)?;
        }
        Ok(())
    }

    fn has_key(&self, ns: &str, item: &str) -> bool {
        self.contents
            .get(ns)
            .map_or(false, |items| items.contains_key(item))
    }

    fn clear_key(&mut self, ns: &str, item: &str) -> Result<(), Error> {
        if let Some(items) = self.contents.get_mut(ns) {
            items.remove(item);
        }
        Ok(())
    }

    fn clear_all(&mut self, ns: &str) -> Result<(), Error> {
        self.contents.remove(ns);
        Ok(())
    }
}
