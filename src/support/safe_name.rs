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

/// Determine whether `key` is safe to use as a cache namespace or item key.
///
/// Disk-backed caches map namespaces to directories and items to files under
/// the cache root, so anything that could escape the root, create hidden
/// files, or collide with OS-specific path syntax is rejected. Generated keys
/// are lowercase hex, so this is deliberately restrictive.
pub fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 128
        // Block directory traversal through .. and hidden files
        && !key.starts_with('.')
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"._-".contains(&b))
}
