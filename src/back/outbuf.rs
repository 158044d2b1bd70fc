//! Line-buffered output with deferred stack-frame patching (spec.md
//! §4.9, "Deferred frame sizing"), grounded in
//! `examples/original_source/outbuf.h`/`outbuf.c`'s `writeln`/`fix_stack`.
//!
//! Prologue/epilogue and frame-relative references are written as opaque
//! tokens while the function's stack size is still unknown, then patched
//! once by [`OutBuf::fix_stack`] after the whole function body has been
//! generated.

pub struct OutBuf {
    lines: Vec<String>,
}

impl OutBuf {
    pub fn new() -> Self {
        OutBuf { lines: vec![] }
    }

    pub fn writeln(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn write(&mut self, text: &str) {
        match self.lines.last_mut() {
            Some(last) => last.push_str(text),
            None => self.lines.push(text.to_string()),
        }
    }

    /// Replaces the deferred tokens (spec.md §4.9 `@P@`, `@E@`,
    /// `@FP@offset@`) now that `stack_size` is known: `@P@`/`@E@` become
    /// the caller-supplied prologue/epilogue text, and `@FP@offset@`
    /// becomes a full register-relative expression built by `sp_format`
    /// from `offset` and `stack_size` — e.g. `"esp + 12"` rather than a
    /// bare `12`, which would assemble as a NASM *absolute* address.
    /// Grounded in `examples/original_source/outbuf.c`'s `fix_stack`,
    /// which takes the same `sp_format` parameter (`"esp + %d"` for the
    /// i386 backend, `"$.i0 - %zu"` for the quadr backend).
    pub fn fix_stack(&mut self, stack_size: u32, prologue: &str, epilogue: &str, sp_format: &dyn Fn(i32, u32) -> String) {
        for line in &mut self.lines {
            if line.contains("@P@") {
                *line = line.replace("@P@", prologue);
            }
            if line.contains("@E@") {
                *line = line.replace("@E@", epilogue);
            }
            while let Some(start) = line.find("@FP@") {
                let rest = &line[start + 4..];
                let end = rest.find('@').expect("unterminated @FP@ token");
                let offset: i32 = rest[..end].parse().expect("malformed @FP@ token");
                let expr = sp_format(offset, stack_size);
                let token_len = 4 + end + 1;
                line.replace_range(start..start + token_len, &expr);
            }
        }
    }

    /// Appends this buffer's lines (one `\n`-joined block) to the
    /// accumulated output and clears it, ready for the next function.
    pub fn flush_into(&mut self, out: &mut String) {
        for line in self.lines.drain(..) {
            out.push_str(&line);
            out.push('\n');
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn into_string(mut self) -> String {
        let mut s = String::new();
        self.flush_into(&mut s);
        s
    }
}

impl Default for OutBuf {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_stack_patches_frame_relative_tokens() {
        let mut buf = OutBuf::new();
        buf.writeln("mov eax, [@FP@-4@]");
        buf.fix_stack(16, "", "", &|offset, stack_size| format!("esp + {}", offset + stack_size as i32));
        assert_eq!(buf.lines[0], "mov eax, [esp + 12]");
    }

    #[test]
    fn fix_stack_substitutes_prologue_and_epilogue() {
        let mut buf = OutBuf::new();
        buf.writeln("@P@");
        buf.writeln("@E@");
        buf.fix_stack(8, "sub esp, 8", "add esp, 8", &|offset, stack_size| format!("esp + {}", offset + stack_size as i32));
        assert_eq!(buf.lines[0], "sub esp, 8");
        assert_eq!(buf.lines[1], "add esp, 8");
    }
}
