// src/nif/writer/helpers.rs

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use encoding_rs::WINDOWS_1252;
use tracing::warn;

use crate::nif::error::Result;
use crate::nif::types::{
    BoundingVolume, Color3, Color4, Key, KeyGroup, KeyType, Matrix3x3, NiTransform, Quaternion,
    Vector2, Vector3, Vector4,
};

/// Windows-1252 bytes of `text`. Characters outside the code page are
/// replaced and reported once per string.
pub fn encode_text(text: &str) -> Vec<u8> {
    let (encoded, _, unmappable) = WINDOWS_1252.encode(text);
    if unmappable {
        warn!("'{}' has characters Windows-1252 cannot hold", text);
    }
    encoded.into_owned()
}

/// `u32` length followed by the bytes, no terminator.
pub fn write_sized_string(w: &mut impl Write, text: &str) -> Result<()> {
    let bytes = encode_text(text);
    w.write_u32::<LittleEndian>(bytes.len() as u32)?;
    w.write_all(&bytes)?;
    Ok(())
}

pub fn write_vector2(w: &mut impl Write, v: &Vector2) -> Result<()> {
    for c in v.0 {
        w.write_f32::<LittleEndian>(c)?;
    }
    Ok(())
}

pub fn write_vector3(w: &mut impl Write, v: &Vector3) -> Result<()> {
    for c in v.0 {
        w.write_f32::<LittleEndian>(c)?;
    }
    Ok(())
}

pub fn write_vector4(w: &mut impl Write, v: &Vector4) -> Result<()> {
    for c in v.0 {
        w.write_f32::<LittleEndian>(c)?;
    }
    Ok(())
}

pub fn write_color3(w: &mut impl Write, c: &Color3) -> Result<()> {
    for channel in c.0 {
        w.write_f32::<LittleEndian>(channel)?;
    }
    Ok(())
}

pub fn write_color4(w: &mut impl Write, c: &Color4) -> Result<()> {
    for channel in c.0 {
        w.write_f32::<LittleEndian>(channel)?;
    }
    Ok(())
}

pub fn write_matrix3x3(w: &mut impl Write, m: &Matrix3x3) -> Result<()> {
    for row in m.0 {
        for value in row {
            w.write_f32::<LittleEndian>(value)?;
        }
    }
    Ok(())
}

/// Gamebryo order: W first.
pub fn write_quat_wxyz(w: &mut impl Write, q: &Quaternion) -> Result<()> {
    w.write_f32::<LittleEndian>(q.w)?;
    w.write_f32::<LittleEndian>(q.x)?;
    w.write_f32::<LittleEndian>(q.y)?;
    w.write_f32::<LittleEndian>(q.z)?;
    Ok(())
}

/// Havok order: W last.
pub fn write_quat_xyzw(w: &mut impl Write, q: &Quaternion) -> Result<()> {
    w.write_f32::<LittleEndian>(q.x)?;
    w.write_f32::<LittleEndian>(q.y)?;
    w.write_f32::<LittleEndian>(q.z)?;
    w.write_f32::<LittleEndian>(q.w)?;
    Ok(())
}

/// Rotation, translation, scale: the order skin data uses.
pub fn write_transform(w: &mut impl Write, t: &NiTransform) -> Result<()> {
    write_matrix3x3(w, &t.rotation)?;
    write_vector3(w, &t.translation)?;
    w.write_f32::<LittleEndian>(t.scale)?;
    Ok(())
}

pub fn write_bounding_volume(w: &mut impl Write, bv: &BoundingVolume) -> Result<()> {
    w.write_u32::<LittleEndian>(bv.collision_type())?;
    match bv {
        BoundingVolume::Sphere(sphere) => {
            write_vector3(w, &sphere.center)?;
            w.write_f32::<LittleEndian>(sphere.radius)?;
        }
        BoundingVolume::Box(bx) => {
            write_vector3(w, &bx.center)?;
            write_matrix3x3(w, &bx.axes)?;
            write_vector3(w, &bx.extent)?;
        }
    }
    Ok(())
}

// --- Keys ---

/// Writes one key's value. Implemented for every value type a key group holds.
pub trait KeyValue {
    fn write_value(&self, w: &mut dyn Write) -> Result<()>;
}

impl KeyValue for f32 {
    fn write_value(&self, w: &mut dyn Write) -> Result<()> {
        w.write_f32::<LittleEndian>(*self)?;
        Ok(())
    }
}

impl KeyValue for Vector3 {
    fn write_value(&self, mut w: &mut dyn Write) -> Result<()> {
        write_vector3(&mut w, self)
    }
}

impl KeyValue for bool {
    fn write_value(&self, w: &mut dyn Write) -> Result<()> {
        w.write_u8(u8::from(*self))?;
        Ok(())
    }
}

/// Time, value, then the extras the interpolation type carries.
pub fn write_key<T: KeyValue>(w: &mut impl Write, key: &Key<T>, key_type: KeyType) -> Result<()> {
    w.write_f32::<LittleEndian>(key.time)?;
    key.value.write_value(w)?;
    match key_type {
        KeyType::Quadratic => {
            if let Some((forward, backward)) = &key.tangents {
                forward.write_value(w)?;
                backward.write_value(w)?;
            } else {
                // Flat tangents when none were given.
                write_zero_tangents(w, &key.value)?;
            }
        }
        KeyType::Tbc => {
            for param in key.tbc.unwrap_or_default() {
                w.write_f32::<LittleEndian>(param)?;
            }
        }
        KeyType::Linear | KeyType::Const | KeyType::XyzRotation => {}
    }
    Ok(())
}

fn write_zero_tangents<T: KeyValue>(w: &mut impl Write, value: &T) -> Result<()> {
    let mut sample = Vec::new();
    value.write_value(&mut sample)?;
    w.write_all(&vec![0u8; sample.len() * 2])?;
    Ok(())
}

/// `num_keys`, then the interpolation type only when there are keys.
pub fn write_key_group<T: KeyValue>(w: &mut impl Write, group: &KeyGroup<T>) -> Result<()> {
    w.write_u32::<LittleEndian>(group.keys.len() as u32)?;
    if group.keys.is_empty() {
        return Ok(());
    }
    w.write_u32::<LittleEndian>(u32::from(group.interpolation))?;
    for key in &group.keys {
        write_key(w, key, group.interpolation)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sized_strings_are_windows_1252() {
        let mut out = Vec::new();
        write_sized_string(&mut out, "Café").unwrap();
        assert_eq!(out, vec![4, 0, 0, 0, b'C', b'a', b'f', 0xE9]);
    }

    #[test]
    fn quaternions_are_written_w_first() {
        let mut out = Vec::new();
        write_quat_wxyz(&mut out, &Quaternion::IDENTITY).unwrap();
        assert_eq!(&out[..4], &1.0f32.to_le_bytes());
        assert!(out[4..].iter().all(|b| *b == 0));
    }

    #[test]
    fn empty_key_groups_omit_the_interpolation() {
        let mut out = Vec::new();
        write_key_group(&mut out, &KeyGroup::<f32>::default()).unwrap();
        assert_eq!(out, vec![0, 0, 0, 0]);

        let mut out = Vec::new();
        let group = KeyGroup::linear(vec![Key::new(0.5, 2.0f32)]);
        write_key_group(&mut out, &group).unwrap();
        assert_eq!(out.len(), 4 + 4 + 8);
        assert_eq!(&out[4..8], &1u32.to_le_bytes());
    }

    #[test]
    fn quadratic_keys_without_tangents_get_flat_ones() {
        let mut out = Vec::new();
        let key = Key::new(0.0, Vector3([1.0, 2.0, 3.0]));
        write_key(&mut out, &key, KeyType::Quadratic).unwrap();
        assert_eq!(out.len(), 4 + 12 + 24);
        assert!(out[16..].iter().all(|b| *b == 0));
    }
}
